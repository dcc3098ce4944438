//! Standalone registry proxy binary

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use registry_proxy::{run_server, ConfigOverrides, Mode, ProxyConfig, Router};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "registry-proxy")]
#[command(about = "Reverse proxy for container registries, one subdomain per registry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, global = true, env = "REGISTRY_PROXY_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    deployment: DeploymentArgs,
}

#[derive(Args)]
struct DeploymentArgs {
    /// Domain the registry subdomains hang off
    #[arg(long, global = true, env = "CUSTOM_DOMAIN")]
    domain: Option<String>,

    /// production or debug
    #[arg(long, global = true, env = "MODE")]
    mode: Option<Mode>,

    /// Upstream for unknown hosts (debug mode only)
    #[arg(long, global = true, env = "TARGET_UPSTREAM")]
    target_upstream: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Host to bind to
        #[arg(long, env = "PROXY_HOST")]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, env = "PROXY_PORT")]
        port: Option<u16>,

        /// Seconds to wait for each read from an upstream (not a whole-transfer limit)
        #[arg(long, env = "UPSTREAM_TIMEOUT_SECS")]
        upstream_timeout: Option<u64>,
    },

    /// Print the hostname to upstream table as JSON
    Routes,
}

fn load_config(cli: &Cli, overrides: ConfigOverrides) -> Result<ProxyConfig> {
    let base = match &cli.config {
        Some(path) => ProxyConfig::load(path)?,
        None => ProxyConfig::default(),
    };
    Ok(base.with_overrides(overrides)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = proxy_logging::init_subscriber();

    let cli = Cli::parse();
    let mut overrides = ConfigOverrides {
        custom_domain: cli.deployment.domain.clone(),
        mode: cli.deployment.mode,
        target_upstream: cli.deployment.target_upstream.clone(),
        ..ConfigOverrides::default()
    };

    match &cli.command {
        Commands::Serve {
            host,
            port,
            upstream_timeout,
        } => {
            overrides.host = host.clone();
            overrides.port = *port;
            overrides.upstream_timeout_secs = *upstream_timeout;
            let config = load_config(&cli, overrides)?;
            run_server(config).await
        }

        Commands::Routes => {
            let config = load_config(&cli, overrides)?;
            let router = Router::from_config(&config);
            println!("{}", serde_json::to_string_pretty(router.table())?);
            Ok(())
        }
    }
}
