use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kdd_collector::capture::PacketSniffer;
use kdd_collector::classifier::list_models;
use kdd_collector::CollectorConfig;

#[derive(Parser, Debug)]
#[command(
    name = "kdd-collector",
    about = "Live network capture to NSL-KDD connection records",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(short, long, help = "JSON config file; flags override its values")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Network interface to capture")]
    interface: Option<String>,

    #[arg(short, long, help = "Output CSV file")]
    output: Option<PathBuf>,

    #[arg(short, long, help = "Capture timeout in seconds")]
    timeout: Option<u64>,

    #[arg(short, long, help = "Time window for traffic features (seconds)")]
    window: Option<u64>,

    #[arg(short, long, help = "Model file to classify with")]
    model: Option<PathBuf>,

    #[arg(long, help = "Directory holding model files")]
    model_dir: Option<PathBuf>,

    #[arg(long, help = "BPF capture filter")]
    filter: Option<String>,

    #[arg(long, help = "Disable machine learning predictions")]
    no_ml: bool,

    #[arg(long, help = "Dashboard URL (e.g. http://localhost:3000)")]
    dashboard: Option<String>,

    #[arg(long, help = "List available network interfaces")]
    list_interfaces: bool,

    #[arg(long, help = "List available models")]
    list_models: bool,
}

impl Cli {
    fn into_config(self) -> Result<CollectorConfig> {
        let mut config = match &self.config {
            Some(path) => CollectorConfig::from_file(path)?,
            None => CollectorConfig::default(),
        };

        if let Some(v) = self.interface {
            config.interface = Some(v);
        }
        if let Some(v) = self.output {
            config.output = v;
        }
        if let Some(v) = self.timeout {
            config.timeout_secs = Some(v);
        }
        if let Some(v) = self.window {
            config.window_secs = v;
        }
        if let Some(v) = self.model {
            config.model = v;
        }
        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        if let Some(v) = self.filter {
            config.filter = v;
        }
        if self.no_ml {
            config.use_ml = false;
        }
        if let Some(v) = self.dashboard {
            config.dashboard_url = Some(v);
        }

        config.validate()?;
        Ok(config)
    }
}

fn print_interfaces() -> Result<()> {
    println!("Available network interfaces:");
    for (i, iface) in PacketSniffer::list_interfaces()?.iter().enumerate() {
        let state = if iface.is_up { "up" } else { "down" };
        println!("  {i}: {} ({}, {state})", iface.name, iface.description);
    }
    Ok(())
}

fn print_models(config: &CollectorConfig) -> Result<()> {
    let models = list_models(&config.model_dir)?;
    if models.is_empty() {
        println!("No ML models found in {}", config.model_dir.display());
        return Ok(());
    }
    println!("Available ML models:");
    for (i, model) in models.iter().enumerate() {
        println!("  {i}: {model}");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kdd_collector=info".parse()?))
        .compact()
        .init();

    let cli = Cli::parse();
    let list_interfaces = cli.list_interfaces;
    let list_models = cli.list_models;
    let config = cli.into_config()?;

    if list_interfaces {
        return print_interfaces();
    }
    if list_models {
        return print_models(&config);
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            info!("Ctrl+C received, stopping capture");
            running.store(false, Ordering::SeqCst);
        }) {
            warn!("Error setting Ctrl+C handler: {err}");
        }
    }

    kdd_collector::run(&config, running)?;
    Ok(())
}
