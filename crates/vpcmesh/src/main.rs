mod commands;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vpcmesh_cloud_aws::Ec2Gateway;
use vpcmesh_config::MeshConfig;
use vpcmesh_core::MeshService;

#[derive(Parser)]
#[command(name = "vpcmesh")]
#[command(about = "Full-mesh IPsec VPN between VPCs, across regions", long_about = None)]
struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect two or more networks with a full mesh of gateways
    Create {
        /// Network id (vpc-...), subnet id (subnet-...) or CIDR block
        #[arg(required = true, num_args = 2.., value_name = "ENDPOINT")]
        endpoints: Vec<String>,
        /// Gateway instance type, overriding the configured one
        #[arg(long)]
        instance_type: Option<String>,
    },
    /// List connections found in every region
    List,
    /// Tear down a connection and everything it created
    Delete {
        /// Connection id as shown by `list`
        #[arg(long, value_name = "CONNECTION_ID")]
        id: String,
    },
    /// Show version information
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration and connect to the provider
async fn mesh_service(instance_type: Option<String>) -> anyhow::Result<MeshService> {
    let mut config = MeshConfig::load()?;
    if let Some(instance_type) = instance_type {
        config.instance_type = instance_type;
    }
    tracing::debug!(
        instance_type = %config.instance_type,
        images = config.images.len(),
        workers = config.fanout_workers,
        "Configuration loaded"
    );

    let gateway = Arc::new(Ec2Gateway::from_env().await);
    Ok(MeshService::new(gateway, config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Create {
            endpoints,
            instance_type,
        } => {
            let service = mesh_service(instance_type).await?;
            commands::create::handle(&service, &endpoints).await
        }
        Commands::List => commands::list::handle(&mesh_service(None).await?).await,
        Commands::Delete { id } => commands::delete::handle(&mesh_service(None).await?, &id).await,
        // no configuration or credentials needed
        Commands::Version => {
            println!("vpcmesh {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
