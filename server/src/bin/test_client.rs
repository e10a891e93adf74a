//! Manual protocol exerciser
//!
//! Connects to a running server, completes the handshake and then wanders
//! around at random, sending heartbeats and eating from its inventory until
//! the run time is up. Everything received is logged.

use clap::Parser;
use log::{info, warn};
use rand::Rng;
use shared::{FrameBuffer, Message, PlayerId, Vec2, Vec3};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:7777")]
    server: String,
    /// Player name to request
    #[clap(short, long, default_value = "TestClient")]
    name: String,
    /// Seconds to stay connected
    #[clap(short, long, default_value = "30")]
    duration: u64,
    /// Milliseconds between movement updates
    #[clap(long, default_value = "100")]
    move_interval: u64,
}

/// Reads the next message, skipping frames that fail to decode
async fn next_message(
    reader: &mut OwnedReadHalf,
    frames: &mut FrameBuffer,
) -> Result<Option<Message>, Box<dyn std::error::Error>> {
    loop {
        if let Some(frame) = frames.next_frame()? {
            match Message::from_frame(&frame) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!("Undecodable frame: {}", e),
            }
            continue;
        }
        if reader.read_buf(frames.buffer_mut()).await? == 0 {
            return Ok(None);
        }
    }
}

fn log_message(message: &Message) {
    match message {
        Message::PlayerSpawn {
            player_id,
            name,
            position,
        } => info!("Player {} ({}) spawned at {:?}", player_id, name, position),
        Message::PlayerMovement { .. } => {}
        Message::StatsUpdate { vitals, .. } => info!(
            "Health {:.1} Hunger {:.1} Thirst {:.1} Temp {:.1}",
            vitals.health, vitals.hunger, vitals.thirst, vitals.temperature
        ),
        Message::InventoryUpdate { slots } => info!("Inventory: {:?}", slots),
        other => info!("Received {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    stream.set_nodelay(true)?;
    info!("Connected to {}", args.server);
    let (mut reader, mut writer) = stream.into_split();
    let mut frames = FrameBuffer::new();

    let request = Message::ConnectionRequest {
        player_name: args.name.clone(),
    };
    writer.write_all(&request.encode()).await?;

    let (player_id, mut position): (PlayerId, Vec3) = loop {
        match next_message(&mut reader, &mut frames).await? {
            Some(Message::ConnectionAccept { player_id, spawn }) => break (player_id, spawn),
            Some(other) => log_message(&other),
            None => return Err("server closed the connection during handshake".into()),
        }
    };
    info!("Accepted as player {} at {:?}", player_id, position);
    writer.write_all(&Message::ClientReady.encode()).await?;

    let receiver = tokio::spawn(async move {
        loop {
            match next_message(&mut reader, &mut frames).await {
                Ok(Some(message)) => log_message(&message),
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    break;
                }
            }
        }
    });

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut movement = interval(Duration::from_millis(args.move_interval.max(1)));
    let mut heartbeat = interval(Duration::from_secs(2));
    let mut snack = interval(Duration::from_secs(7));
    let mut rotation = Vec2::default();

    while Instant::now() < deadline {
        tokio::select! {
            _ = movement.tick() => {
                let (dx, dz, turn) = {
                    let mut rng = rand::thread_rng();
                    (
                        rng.gen_range(-0.5..0.5),
                        rng.gen_range(-0.5..0.5),
                        rng.gen_range(-15.0..15.0),
                    )
                };
                position.x += dx;
                position.z += dz;
                rotation.yaw = (rotation.yaw + turn).rem_euclid(360.0);

                let update = Message::PlayerMovement { player_id, position, rotation };
                writer.write_all(&update.encode()).await?;
            }
            _ = heartbeat.tick() => {
                writer.write_all(&Message::Heartbeat.encode()).await?;
            }
            _ = snack.tick() => {
                writer.write_all(&Message::ItemUse { slot_index: 0 }.encode()).await?;
            }
            _ = sleep(deadline.saturating_duration_since(Instant::now())) => {}
        }
    }

    info!("Disconnecting");
    writer
        .write_all(&Message::PlayerDisconnect { player_id }.encode())
        .await?;
    writer.shutdown().await?;
    let _ = tokio::time::timeout(Duration::from_secs(1), receiver).await;
    Ok(())
}
