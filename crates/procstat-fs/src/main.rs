use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use procstat::config::{Cli, Command};
use procstat::{
    Counter, Getter, MountConfig, Series, SeriesHandle, SimpleHandle, StartEnd, StatsContext,
    ValueFormat,
};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Statistics the demo workload updates.
struct DemoStats {
    jobs_done: Arc<AtomicU64>,
    workers: Arc<AtomicU32>,
    batch: Arc<StartEnd>,
    latency: Arc<Series>,
    queue_depth: Arc<Series>,
}

fn register(context: &StatsContext) -> anyhow::Result<DemoStats> {
    let started = Instant::now();
    let stats = DemoStats {
        jobs_done: Arc::new(AtomicU64::new(0)),
        workers: Arc::new(AtomicU32::new(4)),
        batch: Arc::new(StartEnd::default()),
        latency: Arc::new(Series::new()),
        queue_depth: Arc::new(Series::new()),
    };

    context.create_simple(
        None,
        &[
            SimpleHandle::new(
                "uptime_ms",
                Arc::new(Getter::new(
                    move || started.elapsed().as_millis() as u64,
                    ValueFormat::Decimal,
                )),
            ),
            SimpleHandle::new(
                "pid",
                Arc::new(Getter::new(|| u64::from(std::process::id()), ValueFormat::Decimal)),
            ),
        ],
    )?;

    let jobs = context.create_directory(None, "jobs")?;
    context.create_u64(Some(jobs), "done", stats.jobs_done.clone())?;
    context.create_u32(Some(jobs), "workers", stats.workers.clone())?;
    context.create_leaf(
        Some(jobs),
        "done_hex",
        Arc::new(Counter::new(stats.jobs_done.clone(), ValueFormat::Hex)),
    )?;
    context.create_start_end_u64(Some(jobs), "batch", stats.batch.clone())?;
    context.create_multiple_u64_series(
        Some(jobs),
        &[
            SeriesHandle {
                name: "latency_us".into(),
                series: stats.latency.clone(),
            },
            SeriesHandle {
                name: "queue_depth".into(),
                series: stats.queue_depth.clone(),
            },
        ],
    )?;

    Ok(stats)
}

fn run_workload(stats: DemoStats, interval: Duration, stop: Arc<AtomicBool>) {
    let mut rng = rand::rng();
    let mut next_batch = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let batch_len = rng.random_range(1..=16);
        stats.batch.set(next_batch, next_batch + batch_len - 1);
        next_batch += batch_len;

        stats.jobs_done.fetch_add(batch_len, Ordering::Relaxed);
        for _ in 0..batch_len {
            stats.latency.add_point(rng.random_range(50..5_000));
        }
        stats.queue_depth.add_point(rng.random_range(0..64));

        thread::sleep(interval);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Mount {
            path,
            allow_other,
            no_auto_unmount,
            log_level,
            interval_ms,
        } => {
            // Set up logging
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(&log_level)),
                )
                .init();

            let config = MountConfig {
                mount_point: path.clone(),
                allow_other,
                auto_unmount: !no_auto_unmount,
                ..MountConfig::default()
            };

            let context = Arc::new(StatsContext::for_current_user());
            let stats = register(&context)?;

            let stop = Arc::new(AtomicBool::new(false));
            let workload = {
                let stop = stop.clone();
                let interval = Duration::from_millis(interval_ms);
                thread::spawn(move || run_workload(stats, interval, stop))
            };

            println!("Mounted at {}", path.display());
            let served = procstat::serve(context.clone(), &config);

            stop.store(true, Ordering::Relaxed);
            if workload.join().is_err() {
                anyhow::bail!("workload thread panicked");
            }
            context.teardown();
            served?;
            info!("demo finished");
            println!("Unmounted");
        }

        Command::Unmount { path } => {
            unmount(&path)?;
            println!("Unmounted {}", path.display());
        }

        Command::Status { path } => {
            if path.exists() {
                if is_mounted(&path)? {
                    println!("Status: MOUNTED at {}", path.display());
                } else {
                    println!("Status: NOT MOUNTED (path exists but is not a mount point)");
                }
            } else {
                println!("Status: NOT MOUNTED (path does not exist)");
            }
        }
    }

    Ok(())
}

#[cfg(target_os = "macos")]
fn unmount(path: &Path) -> anyhow::Result<()> {
    let output = std::process::Command::new("umount").arg(path).output()?;

    if !output.status.success() {
        anyhow::bail!("umount failed: {}", String::from_utf8_lossy(&output.stderr));
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn unmount(path: &Path) -> anyhow::Result<()> {
    let output = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(path)
        .output()?;

    if !output.status.success() {
        anyhow::bail!(
            "fusermount -u failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn unmount(_path: &Path) -> anyhow::Result<()> {
    anyhow::bail!("Unmount not supported on this platform")
}

/// Whether `path` shows up as a procstat mount point.
fn is_mounted(path: &Path) -> anyhow::Result<bool> {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let canonical = canonical.display().to_string();

    #[cfg(target_os = "linux")]
    {
        let mounts = std::fs::read_to_string("/proc/mounts")?;
        Ok(mounts
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|mount_point| mount_point == canonical))
    }

    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("mount").output()?;
        let mount_output = String::from_utf8_lossy(&output.stdout);
        Ok(mount_output.contains(&canonical))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = canonical;
        Ok(false)
    }
}
