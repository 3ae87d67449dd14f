//! Wrapping 16-bit sequence comparison
//!
//! Position updates arrive over an unreliable transport, so they can be
//! duplicated or reordered. Each update carries a `u16` counter that wraps at
//! 65536. "Newer" is decided on the ring: a value is newer than the reference
//! when it lies within the half-range window that follows the reference.

/// Distance from the reference to the last value still considered newer.
pub const SEQUENCE_WINDOW: u16 = 32767;

/// Returns true if `candidate` comes after `reference` on the sequence ring
///
/// The window of newer values is `(reference, reference + 32767]`, taken modulo
/// 65536. When the window crosses zero it splits into `(reference, 65535]` and
/// `[0, horizon]`.
///
/// ```
/// use shared::sequence::is_newer;
/// assert!(is_newer(5, 3));
/// assert!(!is_newer(3, 5));
/// assert!(is_newer(2, 65534));
/// assert!(!is_newer(65534, 2));
/// ```
pub fn is_newer(candidate: u16, reference: u16) -> bool {
    let horizon = reference.wrapping_add(SEQUENCE_WINDOW);

    if horizon > reference {
        candidate > reference && candidate <= horizon
    } else {
        candidate > reference || candidate <= horizon
    }
}

/// Returns true if `candidate` comes before `reference` on the sequence ring
pub fn is_older(candidate: u16, reference: u16) -> bool {
    is_newer(reference, candidate)
}

/// Sequence id of the `index`-th sample in a frame whose first sample is `base`
pub fn offset(base: u16, index: usize) -> u16 {
    base.wrapping_add(index as u16)
}
