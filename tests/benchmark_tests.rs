//! Performance benchmarks for the replication hot paths

use bincode::{deserialize, serialize};
use server::config::AntiCheatConfig;
use server::connection::ConnectionTable;
use server::events::{EventPool, MovementEvent, NullEventBus};
use server::game::Game;
use server::geometry::{GeometryLookup, MapGeometry};
use server::session::{GameId, GameSession};
use server::validator::CheatValidator;
use shared::sequence::is_newer;
use shared::{MessageReader, MessageWriter, Packet, Vector2};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Benchmarks wrapping sequence comparison
#[test]
fn benchmark_sequence_comparison() {
    let iterations: u32 = 1_000_000;
    let start = Instant::now();

    let mut newer = 0u32;
    for i in 0..iterations {
        let reference = (i % 65536) as u16;
        if is_newer(reference.wrapping_add(7), reference) {
            newer += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Sequence comparison: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(newer, iterations);
    // Should complete in under 1 second for 1M iterations
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks decoding of multi-sample delta frames
#[test]
fn benchmark_delta_decoding() {
    let mut writer = MessageWriter::new();
    writer.write_u16(100);
    writer.write_packed_u32(16);
    for i in 0..16 {
        writer.write_vector2(Vector2::new(i as f32, -(i as f32)));
    }
    let frame = writer.freeze();

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut reader = MessageReader::new(frame.clone());
        let _ = reader.read_u16().unwrap();
        let count = reader.read_packed_u32().unwrap();
        for _ in 0..count {
            let _ = reader.read_vector2().unwrap();
        }
    }

    let duration = start.elapsed();
    println!(
        "Delta decoding: {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks envelope serialization
#[test]
fn benchmark_packet_serialization() {
    let packet = Packet::ObjectData {
        net_id: 12,
        target: None,
        initial_state: false,
        payload: vec![0u8; 11],
    };

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let data = serialize(&packet).unwrap();
        let _: Packet = deserialize(&data).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} round trips in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks pool checkout and return
#[test]
fn benchmark_event_pool() {
    let pool: EventPool<MovementEvent> = EventPool::new(4);

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let mut event = pool.acquire();
        event.position = Vector2::new(i as f32, 0.0);
    }

    let duration = start.elapsed();
    println!(
        "Event pool: {} checkouts in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(pool.checked_out(), 0);
    assert_eq!(pool.idle(), 1);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the full inbound path for movement frames
#[tokio::test]
async fn benchmark_movement_pipeline() {
    let table = Arc::new(RwLock::new(ConnectionTable::new(
        4,
        AntiCheatConfig::default(),
    )));
    let client_id = table
        .write()
        .await
        .add_client("127.0.0.1:5000".parse().unwrap())
        .unwrap();

    let geometry = MapGeometry::from_json(include_str!("../server/data/skeld.json")).unwrap();
    let map = geometry.map;
    let geometry: Arc<dyn GeometryLookup> = Arc::new(geometry);
    let session = GameSession::new(GameId(1), map, Some(geometry));
    let game = Game::new(session, CheatValidator::new(table), NullEventBus);
    let objects = game.spawn_player(client_id).await.unwrap();

    let iterations: u16 = 10_000;
    let start = Instant::now();

    for sequence_id in 1..=iterations {
        let mut writer = MessageWriter::new();
        writer.write_u16(sequence_id);
        writer.write_packed_u32(1);
        writer.write_vector2(Vector2::new(sequence_id as f32, 0.0));

        game.handle_data(client_id, None, objects.transform_id, writer.freeze(), false)
            .await
            .unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Movement pipeline: {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    let handle = game.object(objects.transform_id).await.unwrap();
    let last = handle
        .lock()
        .await
        .as_transform()
        .map(|transform| transform.last_sequence_id());
    assert_eq!(last, Some(iterations));
    assert!(duration.as_millis() < 2000);
}

