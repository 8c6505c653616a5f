//! jobline - run a dispatcher against a Redis list, or push tasks onto one.

mod demo;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jobline_core::config::{DispatcherConfig, FailurePolicy};
use jobline_core::domain::{FunctionName, TaskDescriptor};
use jobline_core::impls::RedisTaskQueue;
use jobline_core::observability::init_default_logging;
use jobline_core::ports::TaskQueue;
use jobline_core::typed::codec;
use jobline_core::{DispatcherBuilder, WorkerPool};
use serde_json::Value;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "jobline")]
#[command(about = "Queue-backed job dispatcher")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "FILE", env = "JOBLINE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "JOBLINE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Queue name (overrides the config file)
    #[arg(long, env = "JOBLINE_QUEUE")]
    queue: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the worker pool
    Run {
        #[arg(long, env = "JOBLINE_WORKERS")]
        workers: Option<usize>,

        #[arg(long, env = "JOBLINE_POP_TIMEOUT_MS")]
        pop_timeout_ms: Option<u64>,

        /// Push failed tasks onto this queue instead of dropping them
        #[arg(long, env = "JOBLINE_DEAD_LETTER_QUEUE")]
        dead_letter_queue: Option<String>,
    },
    /// Push one task descriptor onto the queue
    Enqueue {
        #[arg(long)]
        func: String,

        /// Positional arguments as a JSON array
        #[arg(long, default_value = "[]")]
        args: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let mut config = match &cli.config {
        Some(path) => match DispatcherConfig::load_from_file(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                process::exit(1);
            }
        },
        None => DispatcherConfig::default(),
    };
    if let Some(queue) = cli.queue {
        config.queue_name = queue;
    }

    let result = match cli.command {
        Commands::Run {
            workers,
            pop_timeout_ms,
            dead_letter_queue,
        } => {
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(ms) = pop_timeout_ms {
                config.pop_timeout_ms = ms;
            }
            if let Some(queue) = dead_letter_queue {
                config.failure_policy = FailurePolicy::DeadLetter { queue };
            }
            run(&cli.redis_url, config).await
        }
        Commands::Enqueue { func, args } => enqueue(&cli.redis_url, &config, func, &args).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run(redis_url: &str, config: DispatcherConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let queue = RedisTaskQueue::connect_with_retry(redis_url, &config.retry_policy()).await?;

    let dispatcher = DispatcherBuilder::new()
        .queue(Arc::new(queue))
        .config(config)
        .register("echo", demo::Echo)?
        .register("sleep", demo::Sleep)?
        .build()?;
    info!(
        functions = ?dispatcher.registry().names(),
        "dispatcher ready"
    );

    let dispatcher = Arc::new(dispatcher);
    let pool = WorkerPool::spawn(Arc::clone(&dispatcher));
    let shutdown = pool.shutdown_handle();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, finishing in-flight tasks");
            shutdown.request_shutdown();
        }
    });

    let result = pool.wait().await;
    info!(counts = ?dispatcher.stats(), "dispatcher stopped");
    result?;
    Ok(())
}

async fn enqueue(
    redis_url: &str,
    config: &DispatcherConfig,
    func: String,
    args: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let arguments: Vec<Value> = serde_json::from_str(args)?;
    let task = TaskDescriptor::new(FunctionName::parse(func)?, arguments);

    let queue = RedisTaskQueue::connect_with_retry(redis_url, &config.retry_policy()).await?;
    queue.push(&config.queue_name, codec::encode(&task)).await?;

    info!(
        queue = config.queue_name.as_str(),
        function_name = task.function_name().as_str(),
        "task enqueued"
    );
    Ok(())
}
