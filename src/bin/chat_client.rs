//! Line-oriented chat client
//!
//! Forwards stdin lines to the relay and prints whatever comes back.
//! Typing `quit` disconnects.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use room_relay::message::QUIT_COMMAND;
use room_relay::{ChatClient, ClientConfig, ServerEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_relay=warn")),
        )
        .init();

    let config = ClientConfig::parse();
    let name = config.display_name();
    let mut client = ChatClient::connect(&config.url, &name, &config.room).await?;
    println!("Connected to room {} as {}. Type a message and hit enter to chat.", config.room, name);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Ok(ServerEvent::RoomList(rooms)) => println!("Available rooms: {}", rooms.join(", ")),
                Ok(ServerEvent::Lines(lines)) => {
                    for line in lines {
                        println!("{}", line);
                    }
                }
                Ok(ServerEvent::Closed) => {
                    println!("Connection closed");
                    break;
                }
                Err(e) => {
                    error!("Connection error: {}", e);
                    break;
                }
            },
            line = stdin.next_line() => match line? {
                Some(line) if line.is_empty() => {}
                Some(line) => {
                    client.send_line(&line).await?;
                    if line == QUIT_COMMAND {
                        debug!("Quit sent");
                        break;
                    }
                }
                None => {
                    client.quit().await?;
                    break;
                }
            },
        }
    }

    Ok(())
}
