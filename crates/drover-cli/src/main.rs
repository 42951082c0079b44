use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::{Value, json};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Level, info};

use drover_core::work::{self, Work};
use drover_core::{
    Dispatcher, DispatcherConfig, DispatcherCounts, ResultStream, SafeStore, ShutdownReport,
    TaskResult,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "drover", about = "Bounded task dispatcher demonstrations")]
struct Args {
    /// Scenario to run
    #[arg(value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Worker count (scenario default if omitted)
    #[arg(long)]
    workers: Option<usize>,

    /// Queue capacity (scenario default if omitted)
    #[arg(long)]
    capacity: Option<usize>,

    /// Log at debug level instead of warn
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Backpressure,
    Counter,
    Drain,
    All,
}

/// Sleeps, then reports how long it actually took.
struct Nap {
    label: String,
    ms: u64,
}

#[async_trait]
impl Work for Nap {
    async fn execute(self: Box<Self>) -> Result<Value, String> {
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(self.ms)).await;
        Ok(json!({
            "label": self.label,
            "slept_ms": started.elapsed().as_millis() as u64,
        }))
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    scenario: &'static str,
    config: DispatcherConfig,
    elapsed_ms: u64,
    counts: DispatcherCounts,
    shutdown: ShutdownReport,
    results: Vec<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<Value>,
}

impl Args {
    /// CLI で指定された値を優先し、なければ scenario の既定値
    fn config(&self, capacity: usize, workers: usize) -> DispatcherConfig {
        DispatcherConfig::new(
            self.capacity.unwrap_or(capacity),
            self.workers.unwrap_or(workers),
        )
    }
}

async fn drain_results(stream: &mut ResultStream) -> Vec<TaskResult> {
    let mut results = Vec::new();
    while let Some(result) = stream.next().await {
        results.push(result);
    }
    results
}

/// N=2, W=1: 3 つの 10ms タスク。3 件目の submit は空きスロットを待つ
async fn backpressure(config: DispatcherConfig) -> Result<Summary, BoxError> {
    let dispatcher = dispatcher(config)?;
    let mut stream = dispatcher.results()?;
    dispatcher.start()?;

    let started = Instant::now();
    for i in 0..3 {
        let id = dispatcher
            .submit(
                Nap {
                    label: format!("nap-{i}"),
                    ms: 10,
                },
                None,
            )
            .await?;
        info!(task_id = %id, "submitted");
    }
    dispatcher.wait_idle(None).await?;
    let elapsed = started.elapsed();

    let shutdown = dispatcher.shutdown(Duration::from_secs(1)).await?;
    Ok(Summary {
        scenario: "backpressure",
        config,
        elapsed_ms: elapsed.as_millis() as u64,
        counts: dispatcher.counts(),
        shutdown,
        results: drain_results(&mut stream).await,
        store: None,
    })
}

/// 2 つの submitter が同じキーを 1000 回ずつ increment する
async fn counter(config: DispatcherConfig) -> Result<Summary, BoxError> {
    let dispatcher = Arc::new(dispatcher(config)?);
    let mut stream = dispatcher.results()?;
    dispatcher.start()?;
    let store = SafeStore::new();

    let started = Instant::now();
    let mut submitters = Vec::new();
    for _ in 0..2 {
        let dispatcher = Arc::clone(&dispatcher);
        let store = store.clone();
        submitters.push(tokio::spawn(async move {
            dispatcher
                .submit(
                    work::from_fn(move || {
                        let mut last = 0;
                        for _ in 0..1000 {
                            last = store.increment("x");
                        }
                        Ok(json!({ "last_seen": last }))
                    }),
                    None,
                )
                .await
        }));
    }
    for submitter in submitters {
        submitter.await??;
    }
    dispatcher.wait_idle(None).await?;
    let elapsed = started.elapsed();

    let shutdown = dispatcher.shutdown(Duration::from_secs(1)).await?;
    Ok(Summary {
        scenario: "counter",
        config,
        elapsed_ms: elapsed.as_millis() as u64,
        counts: dispatcher.counts(),
        shutdown,
        results: drain_results(&mut stream).await,
        store: Some(json!(store.snapshot())),
    })
}

/// 長いタスクを積んだまま drain timeout 0 で shutdown する
async fn drain(config: DispatcherConfig) -> Result<Summary, BoxError> {
    let dispatcher = dispatcher(config)?;
    let mut stream = dispatcher.results()?;
    dispatcher.start()?;

    let started = Instant::now();
    let queued = config.capacity.min(config.workers + 3);
    for i in 0..queued {
        dispatcher
            .submit(
                Nap {
                    label: format!("long-{i}"),
                    ms: 60_000,
                },
                None,
            )
            .await?;
    }

    let shutdown = dispatcher.shutdown(Duration::ZERO).await?;
    Ok(Summary {
        scenario: "drain",
        config,
        elapsed_ms: started.elapsed().as_millis() as u64,
        counts: dispatcher.counts(),
        shutdown,
        results: drain_results(&mut stream).await,
        store: None,
    })
}

fn dispatcher(config: DispatcherConfig) -> Result<Dispatcher, BoxError> {
    Ok(Dispatcher::new(config)?)
}

async fn run(args: &Args) -> Result<Vec<Summary>, BoxError> {
    let mut summaries = Vec::new();
    if matches!(args.scenario, Scenario::Backpressure | Scenario::All) {
        summaries.push(backpressure(args.config(2, 1)).await?);
    }
    if matches!(args.scenario, Scenario::Counter | Scenario::All) {
        summaries.push(counter(args.config(4, 2)).await?);
    }
    if matches!(args.scenario, Scenario::Drain | Scenario::All) {
        summaries.push(drain(args.config(8, 2)).await?);
    }
    Ok(summaries)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let summaries = match run(&args).await {
        Ok(summaries) => summaries,
        Err(err) => {
            eprintln!("drover: {err}");
            return ExitCode::FAILURE;
        }
    };

    for summary in &summaries {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{line}"),
            Err(err) => {
                eprintln!("drover: failed to encode summary: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
