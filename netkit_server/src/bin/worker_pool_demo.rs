//! Demo server exercising worker-pool scheduling: one `tokio::spawn`ed task
//! per accepted connection, bounded by a semaphore.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use netkit_core::config::{SchedulingMode, ServerConfig};
use netkit_core::http::{HttpResponse, Method, StatusCode};
use netkit_core::server::Server;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

#[derive(Parser)]
struct Args {
    /// Address to bind, e.g. 127.0.0.1:8081
    #[arg(long, default_value = "127.0.0.1:8081")]
    addr: SocketAddr,

    /// Maximum concurrent connections served by the worker pool
    #[arg(long, default_value_t = 64)]
    workers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    netkit_core::logging::init();
    let args = Args::parse();

    let config = ServerConfig::new()
        .with_scheduling_mode(SchedulingMode::WorkerPool(args.workers))
        .allow_upgrade("/ws");
    let mut server = Server::new(config);
    server.route(Method::Get, "/", |_req, _ctx| {
        Ok(HttpResponse::new(StatusCode::Ok).with_body(b"worker pool demo".to_vec()))
    });
    server.add_websocket_handler(|peer, opcode, payload| {
        tracing::info!(?peer, ?opcode, len = payload.len(), "ws message");
    });
    let server = Arc::new(server);

    let server_for_run = server.clone();
    let addr = args.addr;
    let run = tokio::spawn(async move {
        if let Err(e) = server_for_run.start(addr).await {
            tracing::error!(error = %e, "server failed to start");
            std::process::exit(1);
        }
    });

    let server_for_stdin = server.clone();
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "exit" {
                server_for_stdin.close();
                break;
            }
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => server.close(),
        _ = run => {},
        _ = stdin_task => {},
    }

    Ok(())
}
