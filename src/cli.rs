//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Each function
//! here loads the config, builds whatever registry/repository/archive it
//! needs, and prints its result as JSON — an operator's way to exercise
//! the planner and archive against a real config file without standing
//! up the HTTP layer this crate deliberately doesn't implement.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use metricgrid::config::Config;
use metricgrid::model::{Job, MetricScope};
use metricgrid::planner::plan_for_job;
use metricgrid::registry::Registry;
use metricgrid::{archive, CoreError};

#[derive(Parser)]
#[command(name = "metricgrid", about = "Scope-aware HPC metric query planner")]
pub struct Cli {
    /// Path to the cluster configuration file.
    #[arg(long, env = "METRICGRID_CONFIG", default_value = "metricgrid.toml")]
    pub config: PathBuf,

    /// Emit JSON-formatted logs instead of the default text format.
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan the query batch for one job, without dispatching it.
    Plan {
        #[arg(long)]
        cluster: String,
        /// Path to a JSON file holding the `Job` to plan for.
        #[arg(long)]
        job: PathBuf,
        /// Comma-separated metric names.
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        /// Comma-separated scopes (hardware-thread, core, memory-domain, socket, accelerator, node).
        #[arg(long, value_delimiter = ',')]
        scopes: Vec<String>,
    },
    /// List archived job keys for a cluster.
    ArchiveLs {
        #[arg(long)]
        cluster: String,
    },
    /// Show one archived job's metadata and data.
    ArchiveShow {
        #[arg(long)]
        cluster: String,
        #[arg(long)]
        job: i64,
        #[arg(long)]
        start: i64,
    },
}

fn load_registry(cli: &Cli) -> Result<Registry> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    Registry::new(config).context("building registry")
}

fn parse_scope(s: &str) -> Result<MetricScope> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .with_context(|| format!("invalid scope: {s:?}"))
}

pub async fn run_plan(cli: &Cli) -> Result<()> {
    let Commands::Plan {
        cluster,
        job,
        metrics,
        scopes,
    } = &cli.command
    else {
        unreachable!("run_plan called for a non-Plan command")
    };

    let registry = load_registry(cli)?;
    let raw = std::fs::read_to_string(job)
        .with_context(|| format!("reading job file {}", job.display()))?;
    let mut job_value: Job = serde_json::from_str(&raw).context("parsing job JSON")?;
    job_value.cluster = cluster.clone();

    let scopes: Vec<MetricScope> = scopes
        .iter()
        .map(|s| parse_scope(s))
        .collect::<Result<_>>()?;

    let (queries, assigned) = plan_for_job(&registry, &job_value, metrics, &scopes, None)
        .map_err(|e: CoreError| anyhow::anyhow!(e))?;

    let out = serde_json::json!({
        "queries": queries,
        "assigned_scopes": assigned,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub async fn run_archive_ls(cli: &Cli) -> Result<()> {
    let Commands::ArchiveLs { cluster } = &cli.command else {
        unreachable!("run_archive_ls called for a non-ArchiveLs command")
    };
    let config = Config::load(&cli.config)?;
    let cluster_cfg = config
        .clusters
        .iter()
        .find(|c| &c.name == cluster)
        .with_context(|| format!("unknown cluster: {cluster}"))?;
    let archive_cfg = cluster_cfg
        .archive
        .as_ref()
        .with_context(|| format!("cluster {cluster} has no archive configured"))?;
    let backend = archive::build(archive_cfg)?;

    let mut stream = backend.iter(cluster);
    while let Some(entry) = stream.next().await {
        match entry {
            Ok(e) => println!("{} job={} start={}", e.cluster, e.job_id, e.start_time),
            Err(err) => eprintln!("skipping entry: {err}"),
        }
    }
    Ok(())
}

pub async fn run_archive_show(cli: &Cli) -> Result<()> {
    let Commands::ArchiveShow {
        cluster,
        job,
        start,
    } = &cli.command
    else {
        unreachable!("run_archive_show called for a non-ArchiveShow command")
    };
    let config = Config::load(&cli.config)?;
    let cluster_cfg = config
        .clusters
        .iter()
        .find(|c| &c.name == cluster)
        .with_context(|| format!("unknown cluster: {cluster}"))?;
    let archive_cfg = cluster_cfg
        .archive
        .as_ref()
        .with_context(|| format!("cluster {cluster} has no archive configured"))?;
    let backend = archive::build(archive_cfg)?;

    let meta = backend.load_job_meta(cluster, *job, *start).await?;
    let data = backend.load_job_data(cluster, *job, *start).await?;
    let out = serde_json::json!({ "meta": meta, "data": data });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
