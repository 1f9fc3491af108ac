//! # StreamAdmin CLI Entry Point
//!
//! Runs one stream administration operation against the producer nodes of
//! a cluster and prints a JSON report to stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Start the maintenance stream for two instances of bucket "default"
//! streamadmin -m cluster.json add-index -s maint -b default -i instances.json
//!
//! # Start from known positions
//! streamadmin -m cluster.json add-index -s init -b default -i instances.json -t ts.json
//!
//! # Remove instances 7 and 8
//! streamadmin -m cluster.json delete-index -s maint -b default --instance 7 --instance 8
//!
//! # Reconnect an endpoint
//! streamadmin -m cluster.json repair-endpoint -s maint -b default -e 10.0.0.5:9105
//!
//! # Restart partitions
//! streamadmin -m cluster.json restart -s maint -t restart.json
//! ```

use anyhow::Result;
use argh::FromArgs;
use std::path::PathBuf;
use streamadmin_cli::commands::{self, Context, Report};
use streamadmin_common::protocol::{InstanceId, StreamId};

#[derive(FromArgs)]
/// StreamAdmin - mutation stream administration
struct Cli {
    /// path to the cluster map JSON file
    ///
    /// Maps each bucket to its server list and partition ownership
    /// (`{"buckets": {"default": {"serverList": [...], "vBucketMap": [...]}}}`).
    #[argh(option, short = 'm', long = "cluster-map")]
    cluster_map: PathBuf,

    /// optional JSON config file
    ///
    /// Holds an `admin` section (pool, partitions, retry pacing) and a
    /// `client` section (producer ports, request timeout).
    #[argh(option, short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// prefix topic names for a test fleet
    #[argh(switch, long = "testing")]
    testing: bool,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    AddIndex(AddIndexArgs),
    DeleteIndex(DeleteIndexArgs),
    RepairEndpoint(RepairEndpointArgs),
    Restart(RestartArgs),
}

/// Arguments for adding index instances to a stream.
///
/// Buckets without an entry in the timestamps file start every partition
/// from the owning node's failover history.
#[derive(FromArgs)]
#[argh(subcommand, name = "add-index")]
/// start or augment a stream for new index instances
struct AddIndexArgs {
    /// stream to act on (maint or init)
    #[argh(option, short = 's')]
    stream: StreamId,

    /// bucket to stream; may be repeated
    #[argh(option, short = 'b', long = "bucket")]
    buckets: Vec<String>,

    /// JSON file with the instance list
    #[argh(option, short = 'i')]
    instances: PathBuf,

    /// optional JSON file with per-bucket start positions
    #[argh(option, short = 't')]
    timestamps: Option<PathBuf>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "delete-index")]
/// remove index instances from a stream
struct DeleteIndexArgs {
    /// stream to act on (maint or init)
    #[argh(option, short = 's')]
    stream: StreamId,

    /// bucket whose nodes hold the instances; may be repeated
    #[argh(option, short = 'b', long = "bucket")]
    buckets: Vec<String>,

    /// instance id to remove; may be repeated
    #[argh(option, long = "instance")]
    instances: Vec<InstanceId>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "repair-endpoint")]
/// ask producers to reconnect an endpoint
struct RepairEndpointArgs {
    /// stream to act on (maint or init)
    #[argh(option, short = 's')]
    stream: StreamId,

    /// bucket whose nodes should repair; may be repeated
    #[argh(option, short = 'b', long = "bucket")]
    buckets: Vec<String>,

    /// endpoint address, as `host:port`
    #[argh(option, short = 'e')]
    endpoint: String,
}

/// Arguments for restarting partitions.
///
/// The timestamps file lists, per bucket, the partitions to restart and the
/// positions to restart them from. Empty timestamps are ignored.
#[derive(FromArgs)]
#[argh(subcommand, name = "restart")]
/// restart partitions from given positions
struct RestartArgs {
    /// stream to act on (maint or init)
    #[argh(option, short = 's')]
    stream: StreamId,

    /// JSON file with the restart positions
    #[argh(option, short = 't')]
    timestamps: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // stdout carries the report, so logs go to stderr
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::from_files(&cli.cluster_map, cli.config.as_deref(), cli.testing)?;
    let report = run(&ctx, cli.command).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(ctx: &Context, command: Commands) -> Result<Report> {
    match command {
        Commands::AddIndex(args) => {
            commands::add_index(
                ctx,
                args.stream,
                &args.buckets,
                &args.instances,
                args.timestamps.as_deref(),
            )
            .await
        }
        Commands::DeleteIndex(args) => {
            commands::delete_index(ctx, args.stream, &args.buckets, &args.instances).await
        }
        Commands::RepairEndpoint(args) => {
            commands::repair_endpoint(ctx, args.stream, &args.buckets, &args.endpoint).await
        }
        Commands::Restart(args) => {
            commands::restart(ctx, args.stream, &args.timestamps).await
        }
    }
}
