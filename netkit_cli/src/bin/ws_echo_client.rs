//! Demo client exercising the upgrade/frame API.

use std::net::SocketAddr;

use clap::Parser;
use netkit_core::client::Client;
use netkit_core::config::ClientConfig;
use netkit_core::ws::WebSocketFrame;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
struct Args {
    /// Address to connect to, e.g. 127.0.0.1:8080
    #[arg(long)]
    addr: SocketAddr,

    /// Host header / TLS server name
    #[arg(long, default_value = "localhost")]
    host: String,

    /// WebSocket upgrade path
    #[arg(long, default_value = "/ws")]
    path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    netkit_core::logging::init();
    let args = Args::parse();

    let config = ClientConfig::new();
    let mut client = match Client::connect(args.addr, args.host, &config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("connect failed: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = client.upgrade(&args.path).await {
        eprintln!("upgrade failed: {e}");
        std::process::exit(1);
    }
    println!("upgraded, type a line to send it, 'exit' to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) if text.trim() == "exit" => break,
                    Ok(Some(text)) => {
                        if client.write_ws(&WebSocketFrame::text(text.into_bytes())).await.is_err() {
                            eprintln!("write failed, connection closed");
                            break;
                        }
                    }
                    _ => break,
                }
            }
            frame = client.read_ws() => {
                match frame {
                    Ok(Some(frame)) => {
                        println!("< {}", String::from_utf8_lossy(&frame.payload));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        eprintln!("connection closed: {e}");
                        break;
                    }
                }
            }
        }
    }

    client.close().await.ok();
    Ok(())
}
