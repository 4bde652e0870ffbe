//! `swarm` — drive one swarm through its branch lifecycle.
//!
//! ```bash
//! # Land two finished branches through swarm/epic-42 into main
//! swarm run --repo ~/rigs/app --epic epic-42 \
//!     --worker Toast --worker Nux --merge toast-work --merge nux-work
//!
//! # Same run against an in-memory repository
//! swarm run --epic epic-42 --worker Toast --merge toast-work --dry-run --json
//!
//! # Branch name a worker should commit to
//! swarm branch --swarm-id sw-3f9c2a1b7d04 --worker Toast --task task-7
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use swarm_coordination::{
    CleanupReport, GitRig, Manager, ManagerConfig, MemoryRig, RepoCall, Repository, Rig, Swarm,
    SwarmResult,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a swarm, merge branches into its integration branch, land and clean up
    Run(RunArgs),
    /// Print the branch a worker commits to for a task
    Branch {
        #[arg(long)]
        swarm_id: String,
        #[arg(long)]
        worker: String,
        #[arg(long)]
        task: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Working copy of the repository
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Epic the swarm works on (integration branch is swarm/<epic>)
    #[arg(long)]
    epic: String,

    /// Worker names, in assignment order
    #[arg(long = "worker", required = true)]
    workers: Vec<String>,

    /// Branch to fork from and land into
    #[arg(long, default_value = "main")]
    base: String,

    /// Finished branches to merge, in merge order
    #[arg(long = "merge")]
    merges: Vec<String>,

    /// TOML config file (overridden by SWARM_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allow cleanup even if landing did not happen
    #[arg(long, default_value_t = false)]
    allow_unlanded_cleanup: bool,

    /// Stop after landing; keep all branches
    #[arg(long, default_value_t = false)]
    no_cleanup: bool,

    /// Use an in-memory repository seeded with the base and merge branches
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Print the final swarm as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// What a run did, for `--json` output.
#[derive(Debug, Serialize)]
struct RunSummary {
    rig: Rig,
    swarm: Swarm,
    #[serde(skip_serializing_if = "Option::is_none")]
    cleanup: Option<CleanupReport>,
    /// Repository calls made, dry runs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    calls: Option<Vec<RepoCall>>,
}

fn load_config(args: &RunArgs) -> Result<ManagerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = ManagerConfig::from_toml_file(path)?;
            config.apply_env();
            config
        }
        None => ManagerConfig::from_env(),
    };
    if args.allow_unlanded_cleanup {
        config.allow_unlanded_cleanup = true;
    }
    Ok(config)
}

/// Log the recovery hint before handing the error to anyhow.
fn step<T>(what: &str, result: SwarmResult<T>) -> Result<T> {
    result
        .inspect_err(|e| {
            if let Some(hint) = e.recovery_suggestion() {
                error!(step = what, kind = ?e.kind(), error = %e, hint, "Swarm step failed");
            }
        })
        .with_context(|| format!("{what} failed"))
}

fn execute(args: &RunArgs) -> Result<RunSummary> {
    let config = load_config(args)?;
    let rig = Rig::from_path(&args.repo);

    let memory = if args.dry_run {
        let seeded = std::iter::once(args.base.clone()).chain(args.merges.iter().cloned());
        Some(Arc::new(MemoryRig::new(rig.clone()).with_branches(seeded)))
    } else {
        None
    };
    let repo: Arc<dyn Repository> = match &memory {
        Some(memory) => memory.clone(),
        None => Arc::new(
            GitRig::open(rig.clone())
                .with_context(|| format!("opening rig at {}", args.repo.display()))?
                .with_retries(config.git_max_retries),
        ),
    };

    let manager = Manager::with_config(repo, config);
    info!(rig = %manager.rig().name, path = %manager.rig().path.display(), "Rig ready");

    let swarm = step("create swarm", manager.create(&args.epic, &args.workers, &args.base))?;
    let id = swarm.id.as_str();

    step(
        "create integration branch",
        manager.create_integration_branch(id),
    )?;
    for branch in &args.merges {
        step("merge", manager.merge_to_integration(id, branch))?;
    }

    if args.merges.is_empty() {
        info!(swarm_id = id, "Nothing merged, skipping land");
    } else {
        step("land", manager.land_to_main(id))?;
    }

    let cleanup = if args.no_cleanup {
        None
    } else {
        Some(step("cleanup", manager.cleanup_branches(id))?)
    };

    Ok(RunSummary {
        rig: manager.rig().clone(),
        swarm: step("read swarm", manager.get_swarm(id))?,
        cleanup,
        calls: memory.map(|m| m.calls()),
    })
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let swarm = &summary.swarm;
    println!("swarm       {}", swarm.id);
    println!("epic        {}", swarm.epic_id);
    println!("integration {}", swarm.integration_branch);
    println!("state       {}", swarm.state);
    println!("history     {}", swarm.history());
    for branch in &swarm.merged_branches {
        println!("merged      {branch}");
    }
    if let Some(cleanup) = &summary.cleanup {
        for branch in &cleanup.deleted {
            println!("deleted     {branch}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run(args) => {
            let summary = execute(&args)?;
            print_summary(&summary, args.json)
        }
        Command::Branch {
            swarm_id,
            worker,
            task,
        } => {
            println!(
                "{}",
                swarm_coordination::worker_branch(&swarm_id, &worker, &task)
            );
            Ok(())
        }
    }
}
