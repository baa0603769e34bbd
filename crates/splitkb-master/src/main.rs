//! splitkb master entry point.
//!
//! Wires the UDP link, the HID sink and the controller together and runs
//! until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()             -- TOML file (first CLI argument) or defaults,
//!                                   written to the platform dir on first start
//!  └─ UdpTransport::bind()      -- emulated radio medium
//!  └─ load_registry()           -- optional, keeps peer ids stable
//!  └─ start tasks
//!       ├─ frame pump           (transport → controller inbox)
//!       └─ MasterController     (Tokio task)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use splitkb_core::transport::{Transport, UdpTransport};
use splitkb_master::application::master_controller::MasterController;
use splitkb_master::infrastructure::hid_output::LoggingHidSink;
use splitkb_master::infrastructure::storage::config::{
    config_file_path, load_config, write_default_config,
};
use splitkb_master::infrastructure::storage::peers::{load_registry, save_registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    // Logging is not up yet, so the outcome is reported after init.
    let first_start = match &config_path {
        Some(_) => Ok(None),
        None => config_file_path().and_then(|path| {
            write_default_config(&path).map(|written| written.then_some(path))
        }),
    };
    let config = load_config(config_path.as_deref()).context("loading master config")?;

    // Level from the config file, overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.master.log_level)),
        )
        .init();

    match first_start {
        Ok(Some(path)) => info!(path = %path.display(), "wrote default config"),
        Ok(None) => {}
        Err(e) => warn!("could not write default config: {e}"),
    }
    info!(address = %config.master.address, "splitkb master starting");

    let (transport, frames) = UdpTransport::bind(config.master.address, &config.link)
        .await
        .context("binding link socket")?;
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let saved = match &config.master.registry_path {
        Some(path) => load_registry(path).unwrap_or_else(|e| {
            warn!("ignoring saved peer registry: {e}");
            None
        }),
        None => None,
    };

    let sink = Arc::new(LoggingHidSink::new());
    let settings = config.controller_settings();
    let (controller, handle) = match saved {
        Some(registry) => MasterController::with_registry(transport, registry, sink, settings),
        None => MasterController::new(transport, sink, settings),
    };

    let pump = handle.spawn_frame_pump(frames);
    let task = tokio::spawn(controller.run());

    info!("splitkb master ready.  Press Ctrl-C to exit.");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    handle.shutdown().await;
    let registry = task.await.context("master controller task panicked")?;
    pump.abort();

    if let Some(path) = &config.master.registry_path {
        save_registry(path, &registry)?;
    }

    info!("splitkb master stopped");
    Ok(())
}
