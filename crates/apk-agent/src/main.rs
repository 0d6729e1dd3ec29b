//! APK Agent - synchronizes control plane API deployments into the cluster

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use apk_common::kube_utils::create_client;
use apk_common::retry::RetryConfig;
use apk_common::telemetry::{init_logging, LogFormat};
use apk_sync::apkconf::ConfigGenerator;
use apk_sync::cluster::KubeClusterClient;
use apk_sync::fetch::http::{build_http_client, HttpControlPlaneClient};
use apk_sync::fetch::{FetchClient, RequestWorkerPool};
use apk_sync::resources::{LocalResourceGenerator, RemoteResourceGenerator, ResourceGenerator};
use apk_sync::{AgentConfig, Synchronizer};

/// APK agent - pulls deployed APIs from the control plane and applies them
#[derive(Parser, Debug)]
#[command(name = "apk-agent", version, about, long_about = None)]
struct Cli {
    /// Path to the agent configuration file
    #[arg(long, short, env = "APK_AGENT_CONFIG", default_value = "config/agent.yaml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run one fetch cycle and print the applied API UUIDs
    Sync {
        /// Fetch only this API
        #[arg(long)]
        api_id: Option<String>,
    },
    /// Sync on startup, then resync periodically until interrupted (default)
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(format)?;

    let config = AgentConfig::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        service_url = %config.control_plane.service_url,
        namespace = %config.data_plane.namespace,
        "starting APK agent"
    );
    let synchronizer = build_synchronizer(&config).await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Sync { api_id } => {
            let report = synchronizer.fetch_apis_on_event(api_id.as_deref()).await?;
            for api_uuid in &report.applied {
                println!("{}", api_uuid);
            }
            for skipped in &report.skipped {
                eprintln!("skipped {} ({})", skipped.api_file, skipped.reason);
            }
            Ok(())
        }
        Commands::Run => run(&synchronizer, config.data_plane.resync_interval()).await,
    }
}

/// Wire the pipeline from configuration
async fn build_synchronizer(config: &AgentConfig) -> anyhow::Result<Synchronizer> {
    let cp = &config.control_plane;

    let transport = HttpControlPlaneClient::new(config)?;
    let pool = RequestWorkerPool::start(&cp.request_worker_pool, Arc::new(transport));
    let fetch = FetchClient::new(
        Arc::new(pool),
        RetryConfig::infinite(cp.retry_interval(), cp.max_retry_interval()),
    );

    let resources: Arc<dyn ResourceGenerator> = match &config.data_plane.k8s_resource_endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "generating resources through the config deployer");
            let http = build_http_client(
                cp.http_client.request_timeout(),
                config.agent.trust_store.location.as_deref(),
                cp.skip_ssl_verification,
            )?;
            Arc::new(RemoteResourceGenerator::new(endpoint, http)?)
        }
        None => Arc::new(LocalResourceGenerator::new(
            config.data_plane.gateway_name.clone(),
        )),
    };

    let client = create_client(config.data_plane.kubeconfig.as_deref()).await?;
    let cluster = Arc::new(KubeClusterClient::new(
        client,
        config.data_plane.namespace.clone(),
    ));

    Ok(Synchronizer::new(
        fetch,
        ConfigGenerator::new(config.rate_limit_catalog()),
        resources,
        cluster,
        config.data_plane.namespace.clone(),
        config.environment_labels(),
    ))
}

/// Full sync on startup, then every `interval` until Ctrl-C
async fn run(synchronizer: &Synchronizer, interval: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                match synchronizer.fetch_apis_on_event(None).await {
                    Ok(report) => info!(
                        applied = report.applied.len(),
                        skipped = report.skipped.len(),
                        "resync finished"
                    ),
                    Err(e) => error!(error = %e, status = ?e.fetch_code(), "resync failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run_with_default_config() {
        let cli = Cli::try_parse_from(["apk-agent"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/agent.yaml"));
        assert!(!cli.log_json);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_sync_with_api_id() {
        let cli = Cli::try_parse_from([
            "apk-agent",
            "--config",
            "/etc/apk/agent.yaml",
            "--log-json",
            "sync",
            "--api-id",
            "8f2c4b1e",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/apk/agent.yaml"));
        assert!(cli.log_json);
        assert_eq!(
            cli.command,
            Some(Commands::Sync {
                api_id: Some("8f2c4b1e".to_string())
            })
        );
    }
}
