use worker_pool::{Config, WorkerPool};
use clap::Parser;
use rand::Rng;
use tokio::runtime::Builder;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use std::time::{Duration, Instant};


/// Запускает tasks x repeats задач, каждая спит случайное время
/// и с заданной вероятностью падает
#[derive(Debug, Parser)]
#[command(name = "worker_pool", version)]
struct Args {
    /// Число значений первого индекса
    #[arg(long, env = "POOL_TASKS", default_value_t = 100)]
    tasks: i64,

    /// Число значений второго индекса
    #[arg(long, env = "POOL_REPEATS", default_value_t = 100)]
    repeats: i64,

    /// Ширина пула (по умолчанию: ядра + 2)
    #[arg(long, env = "POOL_WIDTH")]
    width: Option<usize>,

    /// Максимальная задержка одной задачи
    #[arg(long, env = "POOL_SLEEP_MS", default_value_t = 1000)]
    sleep_ms: u64,

    #[arg(long, env = "POOL_FAILURE_RATE", default_value_t = 0.5)]
    failure_rate: f64,

    #[arg(long, env = "POOL_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("No throwing in thread {0} count {1}")]
struct Adios(i64, i64);

fn simulate(x: i64, y: i64, max_sleep_ms: u64, failure_rate: f64) -> Result<(), Adios> {
    println!("thread: {} count: {}", x, y);
    let mut rng = rand::rng();
    std::thread::sleep(Duration::from_millis(rng.random_range(0..=max_sleep_ms)));
    if rng.random_bool(failure_rate) {
        println!("thread: {} count: {} ADIOS!", x, y);
        return Err(Adios(x, y));
    }
    println!("thread: {} count: {} ends normally", x, y);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.failure_rate),
        "failure rate must be within [0, 1], got {}",
        args.failure_rate
    );

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let outcome = rt.block_on(async {
        let mut config = Config::default().on_failure(|failure| {
            tracing::debug!(a = failure.a, b = failure.b, error = %failure.error, "task failed");
        });
        if let Some(width) = args.width {
            config.width = width;
        }

        let now = Instant::now();
        let pool = WorkerPool::with_config(config)?;
        tracing::info!(width = pool.width(), tasks = args.tasks, repeats = args.repeats, "submitting work");

        let (max_sleep_ms, failure_rate) = (args.sleep_ms, args.failure_rate);
        for i in 0..args.tasks {
            for j in 0..args.repeats {
                pool.submit(i, j, move |x, y| simulate(x, y, max_sleep_ms, failure_rate))?;
            }
        }

        pool.shutdown();
        let finished = pool.await_termination(Duration::from_secs(args.timeout_secs)).await;
        let metrics = pool.metrics();

        if finished {
            println!("all tasks finished in {:?}", now.elapsed());
        } else {
            println!(
                "termination timed out after {}s, {} tasks still outstanding",
                args.timeout_secs,
                metrics.outstanding()
            );
        }
        println!(
            "completed: {}, failed: {}, success rate: {:.1}%",
            metrics.completed_tasks,
            metrics.failed_tasks,
            metrics.success_rate() * 100.0
        );
        Ok::<(), anyhow::Error>(())
    });

    // задачи, не успевшие за таймаут, бросаем
    rt.shutdown_background();
    outcome
}
