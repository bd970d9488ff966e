use std::net::Ipv4Addr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for a single peer to connect, then chat with it.
    Listen(ListenArgs),
    /// Dial a listening peer, retrying until it answers, then chat with it.
    Connect(ConnectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Port to listen on, on all interfaces.
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1024..))]
    pub port: u16,

    /// Username shown to the peer. Prompted for when omitted.
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// IPv4 address of the listening peer.
    #[arg(short, long)]
    pub address: Ipv4Addr,

    /// Port the peer is listening on.
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1024..))]
    pub port: u16,

    /// Username shown to the peer. Prompted for when omitted.
    #[arg(short, long)]
    pub name: Option<String>,
}

impl Command {
    pub fn name(&self) -> Option<&str> {
        match self {
            Command::Listen(args) => args.name.as_deref(),
            Command::Connect(args) => args.name.as_deref(),
        }
    }
}
