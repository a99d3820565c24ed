//! tether server binary entry point.
//!
//! Accepts heartbeat clients and evicts the ones that go quiet.

use clap::Parser;
use tracing::{error, info, warn};

use tether_server::{Cli, Server, ShutdownHandle};

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_format = cli.log_format.into();
    if let Err(e) = tether_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "tether-server starting");

    let config = cli.server_config();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("tether-server: {}", e);
        std::process::exit(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to create tokio runtime");
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async {
        let server = Server::bind(config).await?;
        spawn_ctrl_c(server.shutdown_handle());
        server.run().await
    });

    if let Err(e) = result {
        error!(error = %e, "Server failed");
        eprintln!("tether-server: {}", e);
        std::process::exit(1);
    }
}

fn spawn_ctrl_c(handle: ShutdownHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
        }
        handle.shutdown();
    });
}
