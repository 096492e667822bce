use std::error::Error;
use std::time::{Duration, Instant};

use tracing::info;
use tracing_subscriber::EnvFilter;
use workq_core::{LockStrategy, QueueStats, TaskHandle, WorkQueue};

const USAGE: &str = "usage: workq-cli [fib|files|batch|all] [--lock spin|blocking]";

fn fibonacci(n: u32) -> u64 {
    if n <= 1 {
        return n as u64;
    }
    fibonacci(n - 1) + fibonacci(n - 2)
}

/// ファイル処理のシミュレーション（200ms かかる）
fn process_file(filename: String) -> String {
    std::thread::sleep(Duration::from_millis(200));
    format!("file {filename} processed")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demo {
    Fibonacci,
    Files,
    Batch,
    All,
}

#[derive(Debug)]
struct Options {
    demo: Demo,
    /// 指定があれば全デモの lock 戦略を上書き
    lock: Option<LockStrategy>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options, Box<dyn Error>> {
    let mut options = Options {
        demo: Demo::All,
        lock: None,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "fib" => options.demo = Demo::Fibonacci,
            "files" => options.demo = Demo::Files,
            "batch" => options.demo = Demo::Batch,
            "all" => options.demo = Demo::All,
            "--lock" => {
                let value = args.next().ok_or("--lock needs a value")?;
                options.lock = Some(value.parse()?);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument {other:?}\n{USAGE}").into()),
        }
    }
    Ok(options)
}

fn print_stats(stats: &QueueStats) -> Result<(), Box<dyn Error>> {
    println!("stats: {}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

fn demo_fibonacci(lock: LockStrategy) -> Result<(), Box<dyn Error>> {
    println!("\n--- fibonacci ---");
    let queue = WorkQueue::builder()
        .lock_strategy(lock)
        .thread_name("fib-worker")
        .build()?;

    println!("submitting tasks...");
    let tasks: Vec<(u32, TaskHandle<u64>)> = [10, 15, 20]
        .into_iter()
        .map(|n| (n, queue.submit_with(fibonacci, n)))
        .collect();

    println!("waiting for results...");
    for (n, task) in tasks {
        println!("fib({n}) = {}", task.wait()?);
    }

    print_stats(&queue.stats())?;
    queue.shutdown()?;
    Ok(())
}

fn demo_file_processing(lock: LockStrategy) -> Result<(), Box<dyn Error>> {
    println!("\n--- file processing ---");
    let queue = WorkQueue::builder()
        .lock_strategy(lock)
        .thread_name("file-worker")
        .build()?;

    let files = ["document.txt", "image.jpg", "data.csv", "report.pdf"];
    let results: Vec<_> = files
        .iter()
        .map(|file| queue.submit_with(process_file, file.to_string()))
        .collect();

    println!("processing files...");
    for result in results {
        println!("{}", result.wait()?);
    }

    print_stats(&queue.stats())?;
    queue.shutdown()?;
    Ok(())
}

async fn demo_batch(lock: LockStrategy) -> Result<(), Box<dyn Error>> {
    println!("\n--- batch ---");
    let queue = WorkQueue::builder()
        .lock_strategy(lock)
        .thread_name("batch-worker")
        .build()?;
    let started = Instant::now();

    let tasks: Vec<_> = (0..8)
        .map(|i: i32| {
            queue.submit(move || {
                std::thread::sleep(Duration::from_millis(100));
                i * i
            })
        })
        .collect();

    let mut total = 0;
    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await?;
        total += result;
        println!("task {i} result: {result}");
    }

    println!("total: {total}");
    println!("elapsed: {}ms", started.elapsed().as_millis());
    print_stats(&queue.stats())?;

    // join はブロッキングなので runtime の外で
    tokio::task::spawn_blocking(move || queue.shutdown()).await??;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = parse_args(std::env::args().skip(1))?;
    info!(demo = ?options.demo, lock = ?options.lock, "starting");

    // 元のデモと同じ既定: fib / batch は Blocking、files は Spin
    let blocking = options.lock.unwrap_or(LockStrategy::Blocking);
    let spin = options.lock.unwrap_or(LockStrategy::Spin);

    if matches!(options.demo, Demo::Fibonacci | Demo::All) {
        tokio::task::spawn_blocking(move || demo_fibonacci(blocking).map_err(|e| e.to_string()))
            .await??;
    }
    if matches!(options.demo, Demo::Files | Demo::All) {
        tokio::task::spawn_blocking(move || demo_file_processing(spin).map_err(|e| e.to_string()))
            .await??;
    }
    if matches!(options.demo, Demo::Batch | Demo::All) {
        demo_batch(blocking).await?;
    }

    info!("done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_all_demos() {
        let options = parse_args(args(&[])).unwrap();
        assert_eq!(options.demo, Demo::All);
        assert_eq!(options.lock, None);
    }

    #[test]
    fn parses_demo_and_lock() {
        let options = parse_args(args(&["files", "--lock", "blocking"])).unwrap();
        assert_eq!(options.demo, Demo::Files);
        assert_eq!(options.lock, Some(LockStrategy::Blocking));
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(parse_args(args(&["menu"])).is_err());
        assert!(parse_args(args(&["--lock"])).is_err());
        assert!(parse_args(args(&["--lock", "ticket"])).is_err());
    }

    #[test]
    fn fibonacci_matches_known_values() {
        assert_eq!(fibonacci(10), 55);
        assert_eq!(fibonacci(15), 610);
        assert_eq!(fibonacci(20), 6765);
    }
}
