//! cumulus-provider: inspect resource schemas, plan changes, and reconcile
//! desired state against the in-memory cloud.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cumulus_engine::schema::catalog;
use cumulus_engine::{DesiredState, ProviderConfig, Response};
use cumulus_provider::memory::MemoryCloud;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// cumulus resource provider
#[derive(Parser, Debug)]
#[command(name = "cumulus-provider", version, about)]
struct Args {
    /// Provider configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print resource type schemas
    Schema {
        /// Only this resource type
        type_name: Option<String>,
    },

    /// Plan the transition from a prior desired state to a new one
    Plan {
        /// Resource type name
        #[arg(long = "type")]
        type_name: String,

        /// New desired state (JSON)
        #[arg(long)]
        desired: PathBuf,

        /// Prior desired state (JSON); omit to plan a create
        #[arg(long)]
        prior: Option<PathBuf>,
    },

    /// Create a resource in the in-memory cloud and read it back
    Apply {
        /// Resource type name
        #[arg(long = "type")]
        type_name: String,

        /// Desired state (JSON)
        #[arg(long)]
        desired: PathBuf,

        /// Pre-existing ECS services, as CLUSTER/SERVICE
        #[arg(long = "service")]
        services: Vec<String>,
    },
}

#[derive(Serialize)]
struct ApplyReport {
    create: Response,
    read: Response,
}

fn read_state(path: &Path) -> Result<DesiredState> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cumulus_provider=info,cumulus_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ProviderConfig::load(path)
            .with_context(|| format!("loading provider config {}", path.display()))?,
        None => ProviderConfig::default(),
    };
    info!(partition = %config.partition.id, "Loaded provider configuration");

    let cloud = Arc::new(MemoryCloud::new());
    let registry = cumulus_provider::registry(Arc::new(config), cloud.clone());

    match args.command {
        Command::Schema { type_name: None } => print_json(&catalog(registry.descriptors())),
        Command::Schema {
            type_name: Some(type_name),
        } => match registry.descriptor(&type_name) {
            Some(descriptor) => print_json(descriptor),
            None => bail!("unknown resource type {}", type_name),
        },
        Command::Plan {
            type_name,
            desired,
            prior,
        } => {
            let desired = read_state(&desired)?;
            let prior = prior.as_deref().map(read_state).transpose()?;
            let plan = registry.plan(&type_name, prior.as_ref(), &desired)?;
            print_json(&plan)
        }
        Command::Apply {
            type_name,
            desired,
            services,
        } => {
            for service in &services {
                let Some((cluster, name)) = service.split_once('/') else {
                    bail!("--service expects CLUSTER/SERVICE, got {}", service);
                };
                cloud.add_service(cluster, name).await;
            }

            let desired = read_state(&desired)?;
            let create = registry.create(&type_name, &desired).await;
            let read = match &create.id {
                Some(id) => registry.read(&type_name, id, Some(&desired)).await,
                None => Response::default(),
            };
            let ok = create.is_ok() && read.is_ok();
            print_json(&ApplyReport { create, read })?;
            if !ok {
                bail!("apply of {} failed", type_name);
            }
            Ok(())
        }
    }
}
