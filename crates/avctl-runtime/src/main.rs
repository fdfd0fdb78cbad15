//! avctl: composite A/V device controller.
//! Daemon serving JSON-RPC on a Unix socket, plus one-shot client commands.

use clap::Parser;

mod cli;
mod client;
mod commands;
mod daemon;
mod server;

fn init_logging(default_level: &str) {
    let filter = std::env::var("AVCTL_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let config_path = args.config.clone().unwrap_or_else(cli::default_config_path);
    let socket_path = args.socket_path.clone().unwrap_or_else(cli::default_socket_path);

    match &args.command {
        cli::Command::Daemon => {
            init_logging("info");
            tracing::info!(config = %config_path.display(), "avctl daemon starting");
            daemon::run_daemon(&config_path, &socket_path).await?;
        }
        cli::Command::Check => {
            commands::check(&config_path)?;
        }
        command => {
            init_logging("warn");
            let backend = if args.direct {
                commands::Backend::direct(&config_path)?
            } else {
                commands::Backend::Daemon(socket_path)
            };
            let result = commands::run(&backend, command).await;
            backend.shutdown();
            result?;
        }
    }

    Ok(())
}
