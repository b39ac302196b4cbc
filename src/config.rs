//! Command line and address configuration.
use std::io;
use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_ADDR: &str = "127.0.0.1:1234";
pub const ADDR_ENV: &str = "CHAT_RPC_ADDR";

#[derive(Parser, Debug)]
#[command(
    name = "chat-rpc",
    version,
    about = "A tiny chat room served over a call/reply protocol."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hold the chat history and answer calls.
    Server(NetArgs),
    /// Join the chat interactively.
    Client(NetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct NetArgs {
    /// The host:port to bind to (server) or connect to (client).
    #[arg(long, env = ADDR_ENV, default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl NetArgs {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Resolve `addr` to the first socket address it names.
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        tokio::net::lookup_host(&self.addr)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} did not resolve to any address", self.addr),
                )
            })
    }
}
