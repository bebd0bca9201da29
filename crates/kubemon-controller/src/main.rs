//! kubemon - keeps alerting monitors in sync with annotated cluster objects.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use kubemon_controller::{Controller, ControllerConfig, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "kubemon")]
#[command(about = "Keeps external alerting monitors in sync with Kubernetes objects")]
#[command(version)]
struct Cli {
    /// Monitor store API key
    #[arg(long, env = "DD_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Monitor store application key
    #[arg(long, env = "DD_APP_KEY", default_value = "", hide_env_values = true)]
    app_key: String,

    /// Monitor store base URL
    #[arg(long, env = "DD_API_URL", default_value = kubemon_sync::DEFAULT_API_URL)]
    api_url: String,

    /// Cluster name exposed to templates
    #[arg(long, env = "CLUSTER_NAME", default_value = "")]
    cluster_name: String,

    /// Tag carried by every managed monitor
    #[arg(long, env = "OWNER", default_value = "kubemon")]
    owner: String,

    /// Rule sources, separated by `;`
    #[arg(long, env = "DEFINITIONS_PATH", default_value = "conf.yml")]
    definitions: String,

    /// Log store writes instead of performing them
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Domain of override annotations
    #[arg(long, env = "ANNOTATION_DOMAIN", default_value = "kubemon.io")]
    annotation_domain: String,

    /// Seconds between rule reloads
    #[arg(long, env = "RULE_RELOAD_SECS", default_value_t = 60)]
    rule_reload_secs: u64,

    /// Seconds between static monitor passes
    #[arg(long, env = "STATIC_INTERVAL_SECS", default_value_t = 300)]
    static_interval_secs: u64,

    /// Seconds to wait for the watch caches to sync
    #[arg(long, env = "CACHE_SYNC_TIMEOUT_SECS", default_value_t = 60)]
    cache_sync_timeout_secs: u64,

    /// Log level for kubemon crates
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn config(&self) -> ControllerConfig {
        ControllerConfig {
            api_key: self.api_key.clone(),
            app_key: self.app_key.clone(),
            api_url: self.api_url.clone(),
            cluster_name: self.cluster_name.clone(),
            owner_tag: self.owner.clone(),
            definitions: self.definitions.clone(),
            dry_run: self.dry_run,
            annotation_domain: self.annotation_domain.clone(),
            rule_reload_interval: Duration::from_secs(self.rule_reload_secs),
            static_interval: Duration::from_secs(self.static_interval_secs),
            cache_sync_timeout: Duration::from_secs(self.cache_sync_timeout_secs),
            retry: RetryPolicy::default(),
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter =
        EnvFilter::from_default_env().add_directive(format!("kubemon={}", cli.log_level).parse()?);
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = cli.config();
    info!(
        owner = %config.owner_tag,
        cluster = %config.cluster_name,
        definitions = %config.definitions,
        "starting kubemon"
    );

    let controller = Controller::from_config(config).await?;
    let client = kube::Client::try_default().await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    controller.run(client, shutdown).await?;
    Ok(())
}
