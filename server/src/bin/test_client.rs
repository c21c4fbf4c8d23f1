//! Scripted client for poking a running server by hand.
//!
//! Joins with a character, walks around, fires a few shots and prints everything the
//! server sends back.

use clap::Parser;
use shared::{decode_frame, encode_frame, Action, Direction, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value_t = format!("{DEFAULT_HOST}:{DEFAULT_PORT}"))]
    server: String,

    /// Character to play
    #[arg(short, long, default_value = "Ninja")]
    character: String,

    /// Number of move/shoot rounds to send
    #[arg(short, long, default_value = "10")]
    rounds: u32,
}

async fn send(socket: &UdpSocket, action: &Action) -> Result<(), Box<dyn std::error::Error>> {
    let frame = encode_frame(action)?;
    socket.send(&frame).await?;
    println!("-> {}", String::from_utf8_lossy(&frame));
    Ok(())
}

/// Prints whatever arrives within `window`.
async fn print_incoming(socket: &UdpSocket, window: Duration) {
    let mut buf = [0u8; 2048];
    while let Ok(Ok(len)) = timeout(window, socket.recv(&mut buf)).await {
        match decode_frame(&buf[..len]) {
            Ok(action) => println!(
                "<- {} {:?} (player {})",
                action.action_type,
                action.action_parameters,
                action.player_id.unwrap_or_default()
            ),
            Err(e) => println!("<- undecodable datagram: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&args.server).await?;
    println!("Client {} talking to {}", socket.local_addr()?, args.server);

    send(&socket, &Action::player_init(&args.character)).await?;
    print_incoming(&socket, Duration::from_millis(500)).await;

    let directions = [Direction::Right, Direction::Down, Direction::Left, Direction::Up];
    for round in 0..args.rounds {
        let direction = directions[round as usize % directions.len()];
        for _ in 0..5 {
            send(&socket, &Action::move_step(direction)).await?;
        }

        let angle = round as f32 * 0.6;
        send(&socket, &Action::shoot(angle.cos() * 8.0, angle.sin() * 8.0)).await?;

        print_incoming(&socket, Duration::from_millis(200)).await;
        sleep(Duration::from_millis(300)).await;
    }

    send(&socket, &Action::disconnect()).await?;
    println!("Test client finished");
    Ok(())
}
