//! Demo client exercising the method-agnostic request API.

use std::net::SocketAddr;

use clap::Parser;
use netkit_core::client::Client;
use netkit_core::config::ClientConfig;
use netkit_core::http::Method;

#[derive(Parser)]
struct Args {
    /// Address to connect to, e.g. 127.0.0.1:8080
    #[arg(long)]
    addr: SocketAddr,

    /// Host header / TLS server name
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Request path
    #[arg(long, default_value = "/")]
    path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    netkit_core::logging::init();
    let args = Args::parse();

    let config = ClientConfig::new();
    let client = match Client::connect(args.addr, args.host, &config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("connect failed: {e}");
            std::process::exit(1);
        }
    };

    match client.request(Method::Get, &args.path, &[], Vec::new()).await {
        Ok(response) => {
            println!("HTTP {} {}", response.status, response.reason);
            for (key, value) in response.headers.iter() {
                println!("{key}: {value}");
            }
            println!();
            println!("{}", String::from_utf8_lossy(&response.body));
        }
        Err(e) => {
            eprintln!("request failed: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
