use std::io;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_rpc::config::{Cli, Command, NetArgs};
use chat_rpc::terminal::{read_name, Session};
use chat_rpc::{ChatClient, HistoryStore, Registry, Server};

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_server(args: NetArgs) -> Result<()> {
    let addr = args.resolve().await.context("resolving bind address")?;
    let server = Server::bind(addr, Registry::with_chat(HistoryStore::new()))
        .await
        .with_context(|| format!("Listener error on {}", addr))?;
    let local = server.local_addr()?;
    println!("Server running on {}. Waiting for clients...", local);

    let connections = server
        .run(async {
            shutdown_signal().await;
            println!("\nReceived interrupt. Shutting down...");
        })
        .await;

    if !connections.is_empty() {
        log::info!(
            "waiting for {} open connection(s) to finish, interrupt again to force exit",
            connections.len()
        );
        tokio::select! {
            _ = connections.wait() => {},
            _ = shutdown_signal() => log::warn!("forced exit with connections still open"),
        }
    }
    Ok(())
}

async fn run_client(args: NetArgs) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();
    let name = read_name(&mut input, &mut stdout).await?;

    // The main task may be blocked on stdin or the network; the watcher exits regardless.
    tokio::spawn(async {
        shutdown_signal().await;
        println!("\n[Client] Interrupt signal received. Shutting down...");
        process::exit(0);
    });

    let addr = args.resolve().await.context("resolving server address")?;
    let client = match ChatClient::connect(addr).await {
        Ok(client) => client,
        Err(err) => {
            log::error!("Error connecting to server. Is the server running? {}", err);
            process::exit(1);
        }
    };

    match Session::new(name, client, input, stdout).run().await {
        Ok(_) => Ok(()),
        Err(err) if err.is_fatal() => {
            log::error!("Server connection lost: {}. Exiting.", err);
            process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let args = match &cli.command {
        Command::Server(args) | Command::Client(args) => args.clone(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level()))
        .init();

    match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
    }
}
