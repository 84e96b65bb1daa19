//! Main application entry point for the tic-tac-toe server.
//!
//! Loads configuration from file, environment and command line, sets up
//! logging, then runs the server until a termination signal arrives.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{anyhow, Context};
use cli::CliArgs;
use config::AppConfig;
use std::sync::Arc;
use tictactoe_server::GameServer;
use tracing::{error, info};

/// The configured server plus the settings it was built from.
pub struct Application {
    config: AppConfig,
    server: Arc<GameServer>,
}

impl Application {
    /// Builds the application: configuration in precedence order, logging,
    /// then the server itself.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_env()?;
        config.apply_cli(&args);

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        logging::setup_logging(&config.logging)?;

        let server_config = config.to_server_config()?;
        let server = GameServer::new(server_config).context("Failed to create server")?;

        info!(
            "🎮 Tic-tac-toe server v{} | Config: {}",
            env!("CARGO_PKG_VERSION"),
            args.config_path.display()
        );

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    /// Runs the server until it fails or a shutdown signal is received.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = self.server.config();
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", settings.bind_address);
        info!("  🔌 Transport: {}", settings.transport);
        info!("  🏠 Lobbies: {}", settings.lobbies);
        info!(
            "  ⏱️ Timeouts: handshake {:?}, io {:?}",
            settings.handshake_timeout, settings.io_timeout
        );
        info!(
            "  📝 Logging: {} ({})",
            self.config.logging.level,
            if self.config.logging.json_format { "json" } else { "text" }
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.start().await })
        };

        tokio::select! {
            finished = &mut server_handle => {
                // The server only stops on its own when the listener fails.
                return match finished {
                    Ok(result) => result.context("Server stopped"),
                    Err(e) => Err(anyhow!("Server task failed: {}", e)),
                };
            }
            signal = signals::wait_for_shutdown_signal() => {
                let signal = signal.context("Failed to listen for shutdown signals")?;
                info!("📡 Received {}, initiating graceful shutdown...", signal);
            }
        }

        self.server.shutdown();
        server_handle
            .await
            .map_err(|e| anyhow!("Server task failed: {}", e))?
            .context("Server stopped with an error")?;

        info!("✅ Server shutdown complete");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }
}
