//! Console Chat Client - Entry Point
//!
//! Sends each stdin line as a message and prints everything the server
//! sends back. End of input closes the connection.

use std::env;
use std::io::BufReader;
use std::process::ExitCode;

use tracing::{error, info};

use chat_transport::client::spawn_line_reader;
use chat_transport::config::init_logging;
use chat_transport::{AppError, ChatClient, ClientConfig};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match ClientConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("Client stopped: {}", e);
        eprintln!("Exception: {}", e);
    }

    ExitCode::SUCCESS
}

async fn run(config: ClientConfig) -> Result<(), AppError> {
    let mut client = ChatClient::connect(&config.nickname, &config.host, config.port).await?;
    // console reads stay off the runtime so shutdown never waits on one
    let mut lines = spawn_line_reader(BufReader::new(std::io::stdin()));

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => {
                    if client.write(line).is_err() {
                        break;
                    }
                }
                None => break,
            },
            message = client.recv() => match message {
                Some(message) => println!("{}", String::from_utf8_lossy(&message.body)),
                None => {
                    info!("Connection closed by server");
                    return Ok(());
                }
            },
        }
    }

    client.shutdown().await;
    Ok(())
}
