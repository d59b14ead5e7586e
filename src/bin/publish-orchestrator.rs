//! Publish Orchestrator CLI
//!
//! Publishes a multi-language project to its package registries in a fixed,
//! dependency-aware order. Progress goes to stderr, results to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use publish_orchestrator::{
    CliOverrides, ConfigLoadOptions, ConfigLoader, PublishError, ReleaseRunner, SafeCommandExecutor,
    TokioDelay,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Multi-registry release orchestrator
#[derive(Parser)]
#[command(name = "publish-orchestrator")]
#[command(version)]
#[command(about = "Multi-registry release orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that load the pipeline
#[derive(clap::Args)]
struct PipelineArgs {
    /// Project path (defaults to current directory)
    #[arg(value_name = "PROJECT_PATH")]
    project_path: Option<PathBuf>,

    /// Pipeline file (defaults to PROJECT_PATH/.release-pipeline.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Secrets file (defaults to PROJECT_PATH/.env, then PROJECT_PATH/scripts/.env)
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every enabled target in pipeline order
    Publish {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Run only this target (repeatable)
        #[arg(long, value_name = "TARGET")]
        only: Vec<String>,

        /// Maximum attempts per package (1-10)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Seconds between attempts
        #[arg(long)]
        backoff_secs: Option<u64>,

        /// Seconds to wait after each publish on dependency-ordered targets
        #[arg(long)]
        propagation_delay_secs: Option<u64>,

        /// Print the run report as JSON instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved pipeline and credential status
    Plan {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a starter .release-pipeline.yaml
    Init {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            match e.downcast_ref::<PublishError>() {
                Some(publish_error) => print_publish_error(publish_error),
                None => eprintln!("{:#}", e),
            }
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Publish {
            pipeline,
            only,
            max_attempts,
            backoff_secs,
            propagation_delay_secs,
            json,
        } => {
            let overrides = CliOverrides {
                max_attempts,
                backoff_secs,
                propagation_delay_secs,
                only,
            };
            publish_command(pipeline, overrides, json).await
        }
        Commands::Plan { pipeline, json } => plan_command(pipeline, json).await,
        Commands::Init {
            project_path,
            force,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            init_command(path, force).await
        }
    }
}

fn load_options(pipeline: PipelineArgs, overrides: CliOverrides) -> ConfigLoadOptions {
    ConfigLoadOptions {
        project_path: pipeline.project_path.unwrap_or_else(|| PathBuf::from(".")),
        config_path: pipeline.config,
        env_file: pipeline.env_file,
        overrides,
    }
}

async fn publish_command(pipeline: PipelineArgs, overrides: CliOverrides, json: bool) -> Result<i32> {
    eprintln!("\n🚀 Release run\n");

    let (config, env) = ConfigLoader::load(load_options(pipeline, overrides)).await?;

    let executor = SafeCommandExecutor::new().with_allowed(config.allowed_commands.iter().cloned());
    let delay = TokioDelay;
    let runner = ReleaseRunner::new(&executor, &delay);

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let Some(report) = runner.run_until(&config, &env, interrupt).await else {
        eprintln!("\n⚠️  Interrupted, release run aborted");
        return Ok(1);
    };

    if json {
        println!("{}", report.to_json().context("failed to serialize run report")?);
    } else {
        report.print_summary();
    }

    Ok(if report.success { 0 } else { 1 })
}

async fn plan_command(pipeline: PipelineArgs, json: bool) -> Result<i32> {
    let (config, env) = ConfigLoader::load(load_options(pipeline, CliOverrides::default())).await?;
    let plan = ReleaseRunner::plan(&config, &env);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        plan.print();
    }

    Ok(if plan.ready() { 0 } else { 1 })
}

async fn init_command(project_path: PathBuf, force: bool) -> Result<i32> {
    println!("\n🎯 Initialize publish-orchestrator\n");

    let path = ConfigLoader::write_starter(&project_path, force).await?;
    println!("✅ Created {}", path.display());
    println!("   Edit the targets, then run `publish-orchestrator plan` to check it.\n");

    Ok(0)
}

fn print_publish_error(error: &PublishError) {
    eprintln!("[{}] {}", error.code(), error);

    let actions = error.suggested_actions();
    if !actions.is_empty() {
        eprintln!("\n💡 Suggested actions:");
        for action in actions {
            eprintln!("   - {}", action);
        }
    }
}
