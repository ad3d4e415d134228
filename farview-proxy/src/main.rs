//! farview-proxy entry point.
//!
//! ```text
//! farview-proxy                  Run in the foreground
//! farview-proxy --config <path>  Load a custom config TOML
//! farview-proxy --gen-config     Write default config to stdout
//! farview-proxy --init-config    Write default config to the --config path
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use farview_proxy::config::ProxyConfig;
use farview_proxy::headless::HeadlessDisplay;
use farview_proxy::service::ProxyService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "farview-proxy", about = "Remote display compositor proxy")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "farview-proxy.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the `--config` path and exit.
    #[arg(long)]
    init_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", ProxyConfig::default_toml()?);
        return Ok(());
    }

    if cli.init_config {
        ProxyConfig::write_default(&cli.config)?;
        println!("Default config written to {}", cli.config.display());
        return Ok(());
    }

    let config = ProxyConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let pacing = config.to_pacing_config();
    info!("farview-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("initial tick: {:?}", pacing.initial_tick);
    info!("silence timeout: {:?}", pacing.silence_timeout);
    info!("globals: {}", config.globals.advertise.len());

    let service = ProxyService::new(config, Arc::new(HeadlessDisplay::new()));
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
