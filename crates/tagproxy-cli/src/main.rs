//! tagproxy - HTTP proxy for storage tags on a contactless reader.
//!
//! # Usage
//!
//! ```bash
//! # Mock reader with a blank tag, default port 9090
//! tagproxy --mock-tag
//!
//! # PC/SC reader (build with --features hardware-pcsc)
//! tagproxy --backend pcsc --host 0.0.0.0
//!
//! # Serve a JSON file instead of a tag
//! tagproxy --emulate --emulation-file thing.json
//! ```
//!
//! Logging is controlled with `RUST_LOG` and defaults to `info`.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, Args, BackendKind};
use tagproxy_device::DeviceController;
use tagproxy_hardware::AnyReaderBackend;
use tagproxy_hardware::mock::{MockReader, MockReaderHandle, MockTagHandle, mock_ultralight_tag};
use tagproxy_network::{AppState, HttpServer, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MOCK_READER_NAME: &str = "Mock NFC Reader";

/// Keeps the mock reader and tag alive for the lifetime of the process.
#[derive(Default)]
struct MockGuard {
    _reader: Option<MockReaderHandle>,
    _tag: Option<MockTagHandle>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn build_backend(config: &AppConfig) -> Result<(AnyReaderBackend, MockGuard)> {
    match config.backend {
        BackendKind::Mock => {
            let (reader, handle) = MockReader::with_reader(MOCK_READER_NAME);
            let tag = if config.mock_tag {
                Some(
                    handle
                        .present_tag(mock_ultralight_tag())
                        .await
                        .context("Failed to place mock tag")?,
                )
            } else {
                None
            };
            info!(reader = MOCK_READER_NAME, tag = config.mock_tag, "Using mock reader");
            Ok((
                AnyReaderBackend::Mock(reader),
                MockGuard {
                    _reader: Some(handle),
                    _tag: tag,
                },
            ))
        }
        #[cfg(feature = "hardware-pcsc")]
        BackendKind::Pcsc => {
            let backend = tagproxy_hardware::pcsc::PcscBackend::new()
                .context("Failed to connect to the PC/SC service")?;
            info!("Using PC/SC reader backend");
            Ok((AnyReaderBackend::Pcsc(backend), MockGuard::default()))
        }
        #[cfg(not(feature = "hardware-pcsc"))]
        BackendKind::Pcsc => {
            anyhow::bail!("PC/SC backend not available, rebuild with --features hardware-pcsc")
        }
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = AppConfig::load(&args)?;
    info!(
        version = tagproxy_core::VERSION,
        bind_addr = %config.http.bind_addr,
        root_dir = %config.root_dir.display(),
        emulation_file = %config.device.emulation_file.display(),
        "Starting tagproxy"
    );

    let device = DeviceController::new(config.device.clone());
    let (backend, _mock) = build_backend(&config).await?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let events = tokio::spawn({
        let device = device.clone();
        let cancel = cancel.clone();
        async move { device.run_events(backend, cancel).await }
    });

    if config.emulate {
        if let Err(e) = device.set_emulation(true).await {
            warn!(error = %e, "Failed to start in emulation mode");
        }
    }

    let state = AppState::new(device, Settings::new(&config.root_dir));
    let server = HttpServer::bind(config.http.clone(), state)
        .await
        .context("Failed to start HTTP server")?;

    let served = server.serve(cancel.clone()).await;
    cancel.cancel();

    match events.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Reader event loop failed"),
        Err(e) => error!(error = %e, "Reader event loop panicked"),
    }

    served.context("HTTP server failed")?;
    info!("tagproxy stopped");
    Ok(())
}
