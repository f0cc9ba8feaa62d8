//! spot-resume binary entry point
//!
//! Resolves resume points, syncs checkpoint directories, and runs training
//! commands with spot-style resubmission.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkpoint::CheckpointResolver;
use launcher::{bootstrap, resolve_remote, run_until_complete, storage_from_config};
use launcher::{JobStatus, LocalTrainingService, TrainingJobSpec};
use runtime_core::{EpochNumbering, MissingDirectoryPolicy, RuntimeConfig};
use storage::{prefix_from_uri, ArtifactSync, StorageSync};

#[derive(Parser)]
#[command(author, version, about = "Checkpoint resume decisions for spot training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a JSON configuration file
    #[arg(short, long, value_name = "FILE", env = "SPOT_RESUME_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Decide whether to resume and print the decision as JSON
    Resolve(ResolveArgs),

    /// Copy checkpoints between durable storage and a local directory
    Sync {
        #[arg(value_enum)]
        direction: Direction,

        /// Local checkpoint directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Durable key prefix or s3:// URI
        #[arg(long)]
        from: Option<String>,
    },

    /// Run a training command, resubmitting it after interruptions
    Run {
        /// Job name
        #[arg(long, default_value = "training")]
        name: String,

        /// Attempts before giving up
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,

        /// Per-attempt run limit in seconds
        #[arg(long)]
        max_run_secs: Option<u64>,

        /// Training command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Args)]
struct ResolveArgs {
    /// Checkpoint directory to scan
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Checkpoint file suffix, e.g. `.h5`
    #[arg(long)]
    extension: Option<String>,

    /// Checkpoint filename prefix, e.g. `xgboost-checkpoint.`
    #[arg(long)]
    prefix: Option<String>,

    /// Treat a missing directory as a fresh start
    #[arg(long)]
    allow_missing: bool,

    #[arg(long, value_enum)]
    numbering: Option<Numbering>,

    /// Pull from this durable prefix (or s3:// URI) before resolving
    #[arg(long)]
    sync_from: Option<String>,

    /// Resolve from the durable listing only; nothing is copied
    #[arg(long, requires = "sync_from")]
    remote_only: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Pull,
    Push,
}

#[derive(Clone, Copy, ValueEnum)]
enum Numbering {
    Zero,
    One,
}

impl From<Numbering> for EpochNumbering {
    fn from(n: Numbering) -> Self {
        match n {
            Numbering::Zero => EpochNumbering::ZeroBased,
            Numbering::One => EpochNumbering::OneBased,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Logs go to stderr; stdout carries the JSON decision
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "spot_resume=info,launcher=info,checkpoint=info,storage=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_json_file(path)?,
        None => RuntimeConfig::default(),
    };

    match cli.command {
        Command::Resolve(args) => {
            if let Some(dir) = args.dir {
                config.checkpoint.directory = dir;
            }
            if let Some(extension) = args.extension {
                config.checkpoint.extension = extension;
            }
            if let Some(prefix) = args.prefix {
                config.checkpoint.prefix = Some(prefix);
            }
            if args.allow_missing {
                config.checkpoint.missing_directory = MissingDirectoryPolicy::FreshStart;
            }
            if let Some(numbering) = args.numbering {
                config.checkpoint.numbering = numbering.into();
            }
            config.validate()?;

            let sync = match &args.sync_from {
                Some(uri) => {
                    let remote = storage_from_config(&config.storage).await?;
                    Some(StorageSync::new(remote, prefix_from_uri(uri)))
                }
                None => None,
            };

            let output = match (&sync, args.remote_only) {
                (Some(sync), true) => {
                    let resolver = CheckpointResolver::from_config(&config.checkpoint);
                    let decision = resolve_remote(sync, &resolver).await?;
                    serde_json::to_string_pretty(&decision)?
                }
                _ => {
                    let plan = bootstrap(
                        &config.checkpoint,
                        sync.as_ref().map(|s| s as &dyn ArtifactSync),
                    )
                    .await?;
                    serde_json::to_string_pretty(&plan)?
                }
            };
            println!("{}", output);
        }

        Command::Sync {
            direction,
            dir,
            from,
        } => {
            let dir = dir.unwrap_or_else(|| config.job.checkpoint_local_path.clone());
            let uri = from
                .or_else(|| config.job.checkpoint_uri.clone())
                .ok_or("no durable location: pass --from or set job.checkpoint_uri")?;

            let remote = storage_from_config(&config.storage).await?;
            let sync = StorageSync::new(remote, prefix_from_uri(&uri));
            let report = match direction {
                Direction::Pull => sync.pull(&dir).await?,
                Direction::Push => sync.push(&dir).await?,
            };
            println!(
                "transferred={} skipped={} bytes={}",
                report.transferred, report.skipped, report.bytes
            );
        }

        Command::Run {
            name,
            max_attempts,
            max_run_secs,
            command,
        } => {
            if let Some(secs) = max_run_secs {
                config.job.max_run = Duration::from_secs(secs);
            }
            let (program, args) = command
                .split_first()
                .ok_or("missing training command")?;

            let mut service = LocalTrainingService::new();
            if let Some(uri) = &config.job.checkpoint_uri {
                let remote = storage_from_config(&config.storage).await?;
                service = service.with_sync(Arc::new(StorageSync::new(remote, prefix_from_uri(uri))));
            }

            let spec = TrainingJobSpec::new(name, program.clone())
                .args(args.iter().cloned())
                .spot(config.job.clone());
            let outcome = run_until_complete(&service, spec, max_attempts).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            if outcome.status != JobStatus::Completed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
