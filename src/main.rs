use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use restarter::{
    config::{load_service_dependants, ServiceDependants},
    controller, Error,
};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the restarter loop
    Run(RunArgs),
    /// Load and validate a service dependants document
    Check(CheckArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the service dependants document
    #[arg(long, env = "RESTARTER_CONFIG")]
    config: PathBuf,

    /// Namespace of services and dependants that do not name one
    #[arg(long, env = "RESTARTER_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Seconds between reconcile passes
    #[arg(long, env = "RESTARTER_INTERVAL_SECS", default_value_t = 10)]
    interval_secs: u64,

    /// Log intended deletions and restarts without applying them
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Path to the service dependants document
    #[arg(long, env = "RESTARTER_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("pod-restarter v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Check(check_args) => run_check(check_args),
        Commands::Run(run_args) => run_restarter(run_args).await,
    }
}

fn load_and_validate(path: &Path) -> Result<ServiceDependants, Error> {
    let config = load_service_dependants(path)?;
    if let Err(errors) = config.validate() {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::ConfigError(message));
    }
    Ok(config)
}

fn run_check(args: CheckArgs) -> Result<(), Error> {
    let config = load_and_validate(&args.config)?;

    println!(
        "{}: {} services, {} dependants, minReadySeconds {}",
        args.config.display(),
        config.services.len(),
        config.dependant_count(),
        config.min_ready_seconds
    );
    for (name, service) in &config.services {
        println!(
            "  {} (minReadySeconds {}):",
            name,
            service.effective_min_ready_seconds(config.min_ready_seconds)
        );
        for dependant in &service.dependants {
            println!("    - {} {}", dependant.kind, dependant.name);
        }
    }
    Ok(())
}

async fn run_restarter(args: RunArgs) -> Result<(), Error> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if args.log_json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }

    info!("Starting pod-restarter v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_and_validate(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", args.config.display(), e);
            return Err(e);
        }
    };
    info!(
        "Loaded {} services with {} dependants from {}",
        config.services.len(),
        config.dependant_count(),
        args.config.display()
    );

    if args.interval_secs == 0 {
        return Err(Error::ConfigError(
            "--interval-secs must be greater than zero".to_string(),
        ));
    }

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::RestarterState {
        client,
        config: Arc::new(config),
        namespace: args.namespace,
        interval: Duration::from_secs(args.interval_secs),
        dry_run: args.dry_run,
    });

    controller::run_restarter(state).await
}
