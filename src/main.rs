// TtyBridge - TCP to serial bridge
mod cli;
mod core;
mod domain;
mod infrastructure;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use crate::cli::args::Args;
use crate::core::relay::RelaySettings;
use crate::core::server::BridgeServer;
use crate::core::shutdown::ShutdownCoordinator;
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::SerialPortLink;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let manager = ConfigManager::new(args.config.as_deref())?;
    let mut config = manager.load_config()?;
    args.apply(&mut config);
    config.validate()?;

    // Fragile startup sequence: serial device first, then the listener. The
    // signal listener is installed only once both resources are open, so a
    // signal during startup takes the default process disposition.
    let serial = SerialPortLink::open(&config.serial, config.relay.poll_interval())
        .with_context(|| format!("failed to open serial port {}", config.serial.port))?;
    let listener = BridgeServer::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen.addr()))?;

    let server = BridgeServer::new(
        listener,
        Arc::new(serial),
        RelaySettings::from(&config.relay),
    );

    let coordinator = ShutdownCoordinator::new();
    coordinator.spawn_signal_listener();

    let result = server.run(coordinator.token()).await;

    // Single teardown path: dropping the server releases the listener and
    // the serial handle exactly once.
    drop(server);
    info!("server terminated");
    result.map_err(Into::into)
}
