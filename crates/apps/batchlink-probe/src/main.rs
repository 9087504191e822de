use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use batchlink_client::{Client, ClientConfig, ClientStatus, Connection};
use batchlink_protocol::{ClientMessage, MessageKind, ServiceMessage};
use clap::Parser;
use tokio::runtime::Handle;

/// Connect to a batchlink service and log every status change, error,
/// lambda and batch it produces.
#[derive(Parser, Debug)]
#[command(name = "batchlink-probe", version, about)]
struct Cli {
    /// Service address (`host:port`); overrides the config file
    #[arg(long)]
    service: Option<String>,

    /// TOML client config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Liveness timeout in milliseconds; overrides the config file
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Send every received batch straight back to the service
    #[arg(long, default_value_t = false)]
    echo: bool,

    /// Print the message schemas and exit
    #[arg(long, default_value_t = false)]
    describe: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(cli).await {
        eprintln!("batchlink-probe error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.describe {
        describe();
        return Ok(());
    }

    let config = load_config(&cli)?;
    log::info!("probe: connecting to {}", config.service_addr);
    let client = Connection::connect_on(config, &Handle::current())?;

    let mut statuses = client.on_status();
    let mut errors = client.on_error();
    let mut lambdas = client.on_lambda();
    let mut batches = client.on_batch();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for ctrl-c")?;
                log::info!("probe: interrupted, closing");
                client.close();
            }
            status = statuses.recv() => match status {
                Some(status) => log::info!("probe: status {status}"),
                None => break,
            },
            Some(err) = errors.recv(), if !errors.is_ended() => {
                log::warn!("probe: {err}");
            }
            Some(lambda) = lambdas.recv(), if !lambdas.is_ended() => {
                log::info!("probe: lambda {} ({} bytes)", lambda.lambda_id, lambda.program.len());
            }
            Some(batch) = batches.recv(), if !batches.is_ended() => {
                log::info!(
                    "probe: batch lambda={} batch={} ({} bytes)",
                    batch.lambda_id,
                    batch.batch_id,
                    batch.data.len()
                );
                if cli.echo {
                    client.submit_batch(batch);
                }
            }
        }
    }

    let status = client.status();
    log::info!("probe: finished with status {status}");
    match status {
        ClientStatus::Disrupted => anyhow::bail!("session disrupted"),
        _ => Ok(()),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(service) = &cli.service {
        config.set_service_addr(service.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.set_timeout(Duration::from_millis(timeout_ms));
    }
    config.validate().context("invalid client config")?;
    Ok(config)
}

fn describe() {
    let kinds = [
        MessageKind::Batch,
        MessageKind::Error,
        MessageKind::LogEntry,
        MessageKind::ImAlive,
        MessageKind::Exit,
        MessageKind::Lambda,
    ];
    for kind in kinds {
        if let Some(schema) = ClientMessage::schema(kind) {
            println!("client {kind}: {}", schema.describe());
        }
    }
    for kind in kinds {
        if let Some(schema) = ServiceMessage::schema(kind) {
            println!("service {kind}: {}", schema.describe());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "batchlink-probe",
            "--service",
            "127.0.0.1:7400",
            "--timeout-ms",
            "1500",
            "--echo",
        ]);
        assert!(cli.echo);
        let config = load_config(&cli).expect("config");
        assert_eq!(config.service_addr, "127.0.0.1:7400");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn missing_service_is_rejected() {
        let cli = Cli::parse_from(["batchlink-probe"]);
        assert!(load_config(&cli).is_err());
    }
}
