//! Fairway Bridge entry point.
//!
//! ```text
//! fairway-bridge                          Run with fairway-bridge.toml
//! fairway-bridge --config <path>          Load a custom config TOML
//! fairway-bridge --gen-config             Write default config to stdout
//! fairway-bridge --port 2483              Override the launch monitor port
//! fairway-bridge --simulator-address <host> --simulator-port <port>
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fairway_bridge::config::{BridgeConfig, ConfigSource, LogFormat, LoggingConfig};
use fairway_bridge::service::BridgeService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "fairway-bridge", about = "Launch monitor to golf simulator shot bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "fairway-bridge.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Port the launch monitor connects to.
    #[arg(short, long)]
    port: Option<u16>,

    /// Simulator host name or IP address.
    #[arg(long)]
    simulator_address: Option<String>,

    /// Simulator port.
    #[arg(long)]
    simulator_port: Option<u16>,
}

impl Cli {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(port) = self.port {
            config.monitor.port = port;
        }
        if let Some(address) = &self.simulator_address {
            config.simulator.address = address.clone();
        }
        if let Some(port) = self.simulator_port {
            config.simulator.port = port;
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────

fn init_logging(logging: &LoggingConfig) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.file.is_empty() {
        match logging.format {
            LogFormat::Console => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
        }
        return Ok(());
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logging.file)?;
    let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
    match logging.format {
        LogFormat::Console => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, source) = BridgeConfig::load(&cli.config);
    cli.apply(&mut config);
    init_logging(&config.logging)?;

    info!("fairway-bridge v{}", env!("CARGO_PKG_VERSION"));
    let path = cli.config.display();
    match source {
        ConfigSource::File => info!(%path, "config loaded"),
        ConfigSource::Missing => info!(%path, "no config file, using defaults"),
        ConfigSource::Invalid(e) => warn!(%path, "invalid config, using defaults: {e}"),
    }
    info!(
        "launch monitor: {:?} on {}:{}",
        config.monitor.kind, config.monitor.bind_address, config.monitor.port
    );
    info!(
        "simulator: {:?} at {}:{}",
        config.simulator.kind, config.simulator.address, config.simulator.port
    );
    info!("shot log: {}", config.storage.shot_file.display());

    let service = BridgeService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await?;

    Ok(())
}
