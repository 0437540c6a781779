use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;
use cpupin::Affinity;

/// Spawn one pinned worker per CPU and keep them busy.
#[derive(Debug, Parser)]
#[command(name = "cpupin", version)]
struct Args {
    /// Number of workers to spawn. Defaults to the number of discovered CPUs.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Fibonacci computations per worker.
    #[arg(short, long, default_value_t = 1_000_000)]
    rounds: usize,
}

fn fib(n: u128) -> u128 {
    (0..n).fold((0, 1), |(a, b), _| (b, a + b)).0
}

static TASKS_COMPLETED: AtomicUsize = AtomicUsize::new(0);

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let affinity = Affinity::global();
    let workers = args.workers.unwrap_or(affinity.cpu_count().get());
    log::info!(
        "{} CPUs available, spawning {} workers",
        affinity.cpu_count(),
        workers
    );

    let rounds = args.rounds;
    crossbeam_utils::thread::scope(|s| {
        for index in 0..workers {
            s.spawn(move |_| {
                affinity.pin(index);
                log::info!("Worker #{} runs on CPU {:?}", index, affinity.select_cpu(index));

                for _ in 0..rounds {
                    black_box(fib(130));
                }
                TASKS_COMPLETED.fetch_add(rounds, Ordering::Relaxed);
            });
        }
    })
    .map_err(|_| anyhow::anyhow!("a worker panicked"))?;

    log::info!("Completed {} tasks", TASKS_COMPLETED.load(Ordering::Relaxed));
    Ok(())
}
