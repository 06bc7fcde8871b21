//! Command-line and environment configuration.

use clap::Args;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::broadcast::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to bind to
    #[arg(long, env = "CHATTY_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "CHATTY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Events buffered per channel before slow subscribers start skipping
    #[arg(long, env = "CHATTY_CHANNEL_CAPACITY", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ClientConfig {
    /// Base URL of the chat server
    #[arg(long, env = "CHATTY_SERVER", default_value = "http://127.0.0.1:3000")]
    pub server: String,

    /// Name shown next to your messages; change it later with `/name <new name>`
    #[arg(long, env = "CHATTY_USERNAME")]
    pub username: Option<String>,

    /// Identity presented to the server when joining private channels
    #[arg(long, env = "CHATTY_USER_ID")]
    pub user_id: Option<u64>,
}
