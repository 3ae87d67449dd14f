use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{MessageReader, MessageWriter, NetId, Packet, RpcCall, Vector2, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Scripted client that exercises the replication server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Movement frames to send
    #[arg(short, long, default_value = "10")]
    frames: u16,

    /// Milliseconds between frames
    #[arg(long, default_value = "100")]
    interval_ms: u64,
}

fn delta_frame(sequence_id: u16, position: Vector2) -> Vec<u8> {
    let mut writer = MessageWriter::new();
    writer.write_u16(sequence_id);
    writer.write_packed_u32(1);
    writer.write_vector2(position);
    writer.freeze().to_vec()
}

fn describe(packet: &Packet) -> String {
    match packet {
        Packet::ObjectData {
            net_id,
            initial_state,
            payload,
            ..
        } => {
            let mut reader = MessageReader::new(payload.clone());
            let sequence = reader.read_u16().ok();
            if !initial_state {
                let _ = reader.read_packed_u32();
            }
            match (sequence, reader.read_vector2()) {
                (Some(sequence), Ok(position)) => format!(
                    "object {} seq {} at ({:.2}, {:.2}){}",
                    net_id,
                    sequence,
                    position.x,
                    position.y,
                    if *initial_state { " [initial]" } else { "" }
                ),
                _ => format!("object {} with malformed payload", net_id),
            }
        }
        other => format!("{:?}", other),
    }
}

async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&serialize(packet)?, server).await?;
    Ok(())
}

/// Prints everything that arrives within `wait`
async fn drain(socket: &UdpSocket, wait: Duration) {
    let mut buf = [0u8; 2048];
    while let Ok(Ok((len, _))) = timeout(wait, socket.recv_from(&mut buf)).await {
        match deserialize::<Packet>(&buf[..len]) {
            Ok(packet) => println!("  <- {}", describe(&packet)),
            Err(e) => println!("  <- undecodable packet: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    println!("Sending connection request to {}", args.server);
    send(
        &socket,
        args.server,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
    )
    .await?;

    let mut buf = [0u8; 2048];
    let (transform_id, physics_id): (NetId, NetId) = loop {
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await??;
        match deserialize::<Packet>(&buf[..len])? {
            Packet::Connected {
                client_id,
                player_id,
                transform_id,
                physics_id,
            } => {
                println!(
                    "Connected as client {} (player {}, transform {}, physics {})",
                    client_id, player_id, transform_id, physics_id
                );
                break (transform_id, physics_id);
            }
            Packet::Disconnected { reason } => {
                println!("Connection refused: {}", reason);
                return Ok(());
            }
            other => println!("  <- {}", describe(&other)),
        }
    };

    drain(&socket, Duration::from_millis(200)).await;

    // Walk in a circle, then replay an old frame the server must ignore
    for sequence in 1..=args.frames {
        let angle = sequence as f32 * 36.0;
        let position = Vector2::UP.rotate(angle) * 2.0;

        println!("  -> frame {} at ({:.2}, {:.2})", sequence, position.x, position.y);
        send(
            &socket,
            args.server,
            &Packet::ObjectData {
                net_id: transform_id,
                target: None,
                initial_state: false,
                payload: delta_frame(sequence, position),
            },
        )
        .await?;

        sleep(Duration::from_millis(args.interval_ms)).await;
    }

    println!("  -> duplicate of frame 1");
    send(
        &socket,
        args.server,
        &Packet::ObjectData {
            net_id: transform_id,
            target: None,
            initial_state: false,
            payload: delta_frame(1, Vector2::ZERO),
        },
    )
    .await?;

    // First snap after spawn is checked against the spawn point; this one fails
    let mut snap = MessageWriter::new();
    snap.write_vector2(Vector2::new(100.0, 100.0));
    snap.write_u16(args.frames.wrapping_add(1));
    println!("  -> SnapTo (100, 100)");
    send(
        &socket,
        args.server,
        &Packet::ObjectRpc {
            net_id: transform_id,
            target: None,
            call: RpcCall::SnapTo.id(),
            payload: snap.freeze().to_vec(),
        },
    )
    .await?;

    let mut vent = MessageWriter::new();
    vent.write_packed_u32(0);
    println!("  -> EnterVent 0");
    send(
        &socket,
        args.server,
        &Packet::ObjectRpc {
            net_id: physics_id,
            target: None,
            call: RpcCall::EnterVent.id(),
            payload: vent.freeze().to_vec(),
        },
    )
    .await?;

    drain(&socket, Duration::from_millis(500)).await;

    println!("Sending disconnect request");
    send(&socket, args.server, &Packet::Disconnect).await?;

    println!("Test client finished");
    Ok(())
}
