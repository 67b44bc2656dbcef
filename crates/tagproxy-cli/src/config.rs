//! Command line arguments and configuration file.
//!
//! Values are taken from, in increasing priority: built-in defaults, the
//! TOML file given with `--config`, and command line flags.
//!
//! ```toml
//! [http]
//! host = "0.0.0.0"
//! port = 9090
//! root_dir = "/srv/tagproxy"
//!
//! [device]
//! backend = "pcsc"
//! tag_timeout_ms = 3000
//! emulation_file = "/var/lib/tagproxy/thing.json"
//! emulate = false
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagproxy_device::DeviceConfig;
use tagproxy_network::HttpServerConfig;

/// Reader backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Simulated reader, no hardware needed.
    #[default]
    Mock,
    /// PC/SC smart card service.
    Pcsc,
}

/// Storage tag device proxy.
#[derive(Debug, Clone, Parser)]
#[command(name = "tagproxy", version, about)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TAGPROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory static resources are served from
    #[arg(long)]
    pub root_dir: Option<PathBuf>,

    /// Reader backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Upper bound for one tag read or write, in milliseconds
    #[arg(long)]
    pub tag_timeout_ms: Option<u64>,

    /// JSON file substituted for the tag in emulation mode
    #[arg(long)]
    pub emulation_file: Option<PathBuf>,

    /// Start in emulation mode
    #[arg(long)]
    pub emulate: bool,

    /// Place a blank tag on the mock reader at startup
    #[arg(long)]
    pub mock_tag: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    http: HttpSection,
    device: DeviceSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HttpSection {
    host: Option<IpAddr>,
    port: Option<u16>,
    root_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DeviceSection {
    backend: Option<BackendKind>,
    tag_timeout_ms: Option<u64>,
    emulation_file: Option<PathBuf>,
    overwrite_emulation: Option<bool>,
    emulate: Option<bool>,
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http: HttpServerConfig,
    pub root_dir: PathBuf,
    pub device: DeviceConfig,
    pub backend: BackendKind,
    pub emulate: bool,
    pub mock_tag: bool,
}

impl AppConfig {
    /// Merge defaults, the configuration file and the flags.
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    fn merge(args: &Args, file: FileConfig) -> Self {
        let default_http = HttpServerConfig::default();
        let host = args
            .host
            .or(file.http.host)
            .unwrap_or(default_http.bind_addr.ip());
        let port = args
            .port
            .or(file.http.port)
            .unwrap_or(default_http.bind_addr.port());

        let mut device = DeviceConfig::default();
        if let Some(ms) = args.tag_timeout_ms.or(file.device.tag_timeout_ms) {
            device = device.with_tag_timeout(Duration::from_millis(ms));
        }
        if let Some(path) = args.emulation_file.clone().or(file.device.emulation_file) {
            device = device.with_emulation_file(path);
        }
        if let Some(overwrite) = file.device.overwrite_emulation {
            device = device.with_overwrite_emulation(overwrite);
        }

        Self {
            http: default_http.with_bind_addr(SocketAddr::new(host, port)),
            root_dir: args
                .root_dir
                .clone()
                .or(file.http.root_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            device,
            backend: args.backend.or(file.device.backend).unwrap_or_default(),
            emulate: args.emulate || file.device.emulate.unwrap_or(false),
            mock_tag: args.mock_tag,
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid configuration {}", path.display()))
}
