use clap::Parser;
use log::{error, info};
use server::network::{BoxError, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use server::rules::RulesConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

/// Parses command-line arguments and serves games until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    let args = Args::parse();
    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        rules: RulesConfig::default(),
    };

    let server = Server::bind(config).await?;
    server.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
