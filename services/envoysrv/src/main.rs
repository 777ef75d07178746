//! envoysrv - Enphase Envoy gateway to InfluxDB exporter
//! Scrapes production, inverter and battery telemetry on a fixed interval

use clap::Parser;
use envoy_libs::logging::{self, LogFormat};
use envoy_libs::shutdown;
use envoysrv::collector::Collector;
use envoysrv::config::{Config, DEFAULT_CONFIG_PATH};
use envoysrv::envoy::{ClientOptions, EnvoyConnector};
use envoysrv::poller::{self, Poller};
use envoysrv::sink::InfluxSink;
use envoysrv::{api, Context, Result, SERVICE_NAME, SERVICE_VERSION};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "envoysrv", version, about = "Enphase Envoy to InfluxDB exporter")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level, overrides the configuration file
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_validated(&cli.config)
        .with_context(|| format!("Invalid configuration {}", cli.config))?;

    if cli.validate {
        println!("Configuration {} is valid", cli.config);
        return Ok(());
    }

    let log_format: LogFormat = config.log_format.parse()?;
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    logging::init(log_level, log_format)?;

    info!(
        "Starting {} v{} - gateway {} (serial {}), interval {:?}",
        SERVICE_NAME,
        SERVICE_VERSION,
        config.address,
        config.serial_number,
        config.interval()
    );

    let token = CancellationToken::new();
    let signal_handle = shutdown::cancel_on_shutdown(token.clone());

    let api_handle = tokio::spawn(api::serve(config.debug_port(), token.clone()));

    let sink = InfluxSink::new(
        &config.influxdb_url,
        &config.influxdb_org,
        &config.influxdb_bucket,
        &config.influxdb_token,
    )?;
    match sink.ping().await {
        Ok(()) => info!("InfluxDB at {} is ready", sink.client().url()),
        Err(e) => warn!("InfluxDB is not reachable yet: {}", e),
    }

    let connector = EnvoyConnector::new(ClientOptions::from_config(&config));
    let collector = Collector::new(config.source_tag.clone()).with_comm_check(config.comm_check);
    let scrape_loop = Poller::new(connector, sink, collector, config.interval());

    let poller_handle = tokio::spawn(scrape_loop.run(token.clone()));
    let loop_result = poller::join_loop(poller_handle).await;

    // The loop only returns after cancellation, unless it crashed
    token.cancel();
    let _ = api_handle.await;
    let _ = signal_handle.await;

    loop_result?;
    info!("{} stopped", SERVICE_NAME);
    Ok(())
}
