use anyhow::Result;
use chatty::{
    client,
    config::{ClientConfig, ServerConfig},
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "chatty", version, about = "Real-time broadcast chat")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat server
    Serve(ServerConfig),
    /// Join the public channel from the terminal
    Chat(ClientConfig),
}

/// Logs go to stderr so the chat client's stdout stays a clean transcript.
fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(config) => {
            init_tracing("chatty=info,tower_http=info");
            chatty::run_server(&config).await
        }
        Commands::Chat(config) => {
            init_tracing("chatty=warn");
            client::session::run(config).await
        }
    }
}
