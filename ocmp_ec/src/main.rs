//! # OCMP Embedded Controller
//!
//! Boots the message bus over the demo schema, wires the configured
//! transports, runs POST and serves OCMP traffic until Ctrl-C.

use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use clap::Parser;
use ocmp_bus::transport::TransportMux;
use ocmp_bus::{BusOptions, MessageBus};
use ocmp_common::config::EcConfig;
use ocmp_ec::{sim, tcp};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ocmp_ec", about = "OCMP embedded controller")]
struct Cli {
    /// Path to the EC configuration file (TOML). Defaults apply when
    /// omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit JSON log lines (overrides the config file).
    #[arg(long)]
    log_json: bool,

    /// Skip the power-on self-test cycle.
    #[arg(long)]
    no_post: bool,
}

fn init_logging(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_names(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EcConfig::load(path)?,
        None => EcConfig::default(),
    };
    init_logging(config.log.json || cli.log_json);
    info!("starting OCMP embedded controller");

    let schema = Arc::new(sim::demo_schema()?);

    let mut transports = TransportMux::new();
    let tcp = match &config.transport.tcp_listen {
        Some(addr) => {
            let transport = tcp::TcpTransport::bind(addr)?;
            transports.register(transport.clone());
            Some(transport)
        }
        None => None,
    };

    let mut options = BusOptions::from(&config);
    if cli.no_post {
        options.run_post = false;
    }

    let mut bus = MessageBus::start(schema, transports, options)?;
    if let Some(transport) = &tcp {
        transport.start(bus.handle())?;
    }

    // Block until Ctrl-C.
    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    let _ = stop_rx.recv();
    info!("shutdown signal received");

    match serde_json::to_string_pretty(&bus.post_results()) {
        Ok(json) => info!("POST results:\n{json}"),
        Err(e) => error!("POST result dump failed: {e}"),
    }

    bus.shutdown();
    info!("OCMP embedded controller stopped");
    Ok(())
}
