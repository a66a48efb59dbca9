use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use hygro_collector::{
    config::{Config, ConfigError, SinkConfig},
    fetcher::Fetcher,
    scheduler::{ScheduleConfig, Scheduler, StopReason},
    sink::{InfluxSink, LogSink, Sink},
};
use hygro_core::Endpoint;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "hygro-collector")]
#[command(about = "Polls SwitchBot sensors and writes samples to InfluxDB")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hygro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the configured endpoints (default)
    Run {
        /// Override the polling interval
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Stop after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Print the raw device list of the account
    Devices,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        info!(path = ?path, "Loaded .env");
    }

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };
    config.apply_env();

    match cli.command.unwrap_or(Command::Run {
        interval_secs: None,
        deadline_secs: None,
    }) {
        Command::Run {
            interval_secs,
            deadline_secs,
        } => {
            if let Some(secs) = interval_secs {
                config.collector.interval_secs = secs;
            }
            if deadline_secs.is_some() {
                config.collector.deadline_secs = deadline_secs;
            }
            config.validate()?;
            run(config).await
        }
        Command::Devices => {
            if !config.credentials().is_complete() {
                return Err(ConfigError::MissingCredentials.into());
            }
            let fetcher = fetcher(&config)?;
            let devices = fetcher
                .list_devices()
                .await
                .wrap_err("failed to list devices")?;
            println!("{devices}");
            Ok(())
        }
    }
}

fn fetcher(config: &Config) -> color_eyre::Result<Fetcher> {
    let fetcher = Fetcher::new(Arc::new(config.credentials()), config.request_timeout())?
        .with_api_base(config.switchbot.api_base.as_str());
    Ok(fetcher)
}

async fn run(config: Config) -> color_eyre::Result<()> {
    let fetcher = fetcher(&config)?;
    let schedule = config.schedule();
    let endpoints: Arc<[Endpoint]> = config.endpoints.clone().into();

    for endpoint in endpoints.iter() {
        info!(url = %endpoint.url, profile = %endpoint.profile, "Polling endpoint");
    }

    match config.sink {
        SinkConfig::Log => {
            info!("Using log sink");
            run_scheduler(schedule, endpoints, fetcher, LogSink).await
        }
        SinkConfig::Influx(influx) => {
            info!(url = %influx.url, org = %influx.org, bucket = %influx.bucket, "Using InfluxDB sink");
            let sink = InfluxSink::new(influx, schedule.write_timeout)?;
            run_scheduler(schedule, endpoints, fetcher, sink).await
        }
    }
}

async fn run_scheduler<S>(
    schedule: ScheduleConfig,
    endpoints: Arc<[Endpoint]>,
    fetcher: Fetcher,
    sink: S,
) -> color_eyre::Result<()>
where
    S: Sink,
{
    let scheduler = Scheduler::new(schedule, endpoints, fetcher, sink);
    let cancel = CancellationToken::new();

    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            cancel_on_signal.cancel();
        }
    });

    let summary = scheduler.run(cancel).await;
    match summary.reason {
        StopReason::Deadline => info!("Deadline reached"),
        StopReason::Cancelled => info!("Stopped on request"),
    }

    Ok(())
}
