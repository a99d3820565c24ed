//! tether client binary entry point.
//!
//! Holds a heartbeat connection to a tether server, reconnecting as needed.

use clap::Parser;
use tracing::{error, info, warn};

use tether_client::{Cli, Client, ClientHandle};

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_format = cli.log_format.into();
    if let Err(e) = tether_core::init_logging(cli.verbose, Some(cli.log_file.as_path()), log_format)
    {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "tether client starting");

    let config = cli.client_config();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("tether: {}", e);
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
        let client = Client::new(config);
        spawn_ctrl_c(client.handle());
        client.run().await
    });

    if let Err(e) = result {
        error!(error = %e, "Client exited");
        eprintln!("tether: {}", e);
        std::process::exit(1);
    }
}

fn spawn_ctrl_c(handle: ClientHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
        }
        handle.stop();
    });
}
