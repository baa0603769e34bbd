//! splitkb peripheral entry point.
//!
//! ```text
//! main()
//!  └─ load_config()             -- TOML file (first CLI argument) or defaults,
//!                                   written to the platform dir on first start
//!  └─ UdpTransport::bind()      -- emulated radio medium
//!  └─ start tasks
//!       ├─ frame pump           (transport → controller inbox)
//!       ├─ stdin matrix source  (text commands → controller inbox)
//!       └─ PeripheralController (pairing, forwarding, config replies)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use splitkb_core::transport::{Transport, UdpTransport};
use splitkb_peripheral::application::peripheral_controller::PeripheralController;
use splitkb_peripheral::infrastructure::matrix::spawn_stdin_source;
use splitkb_peripheral::infrastructure::storage::config::{
    config_file_path, load_config, write_default_config,
};

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
    let config = load_config(config_path.as_deref()).context("loading peripheral config")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.peripheral.log_level)),
        )
        .init();

    match first_start {
        Ok(Some(path)) => info!(path = %path.display(), "wrote default config"),
        Ok(None) => {}
        Err(e) => warn!("could not write default config: {e}"),
    }
    info!(address = %config.peripheral.address, "splitkb peripheral starting");

    let device = config.device_config()?;
    let keys = device.key_count();

    let (transport, frames) = UdpTransport::bind(config.peripheral.address, &config.link)
        .await
        .context("binding link socket")?;
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let (controller, handle) =
        PeripheralController::new(transport, device, config.controller_settings());
    let pump = handle.spawn_frame_pump(frames);
    let matrix = spawn_stdin_source(handle.clone(), keys);
    let task = tokio::spawn(controller.run());

    info!(keys, "splitkb peripheral ready.  Type `down N` / `up N`; Ctrl-C to exit.");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    handle.shutdown().await;
    let state = task.await.context("peripheral controller task panicked")?;
    matrix.abort();
    pump.abort();

    info!(?state, "splitkb peripheral stopped");
    Ok(())
}
