//! Batch mode: the refresh loop printing one line per displayed task.

use anyhow::Context;
use pmctop::{CounterManager, Monitor, PerfBackend, ScreenCatalog, SortOrder, TaskScanner};
use std::io::{self, Write};
use std::time::Duration;
use tokio::signal;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_DELAY};

/// Delay before the first printed cycle; enough for meaningful deltas.
pub const FIRST_INTERVAL: Duration = Duration::from_millis(200);

/// Completes on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Runs the monitor until `max_iter` cycles were printed or a signal arrives.
pub async fn command_batch(
    config: &Config,
    catalog: ScreenCatalog,
    sort: SortOrder,
) -> anyhow::Result<()> {
    let screen = config.screen.unwrap_or(0);
    let counters = CounterManager::new(PerfBackend::new(config.show_kernel.unwrap_or(false)));
    let scanner = TaskScanner::new(config.proc_root());
    let mut monitor = Monitor::new(
        catalog,
        screen,
        counters,
        scanner,
        config.monitor_options(sort),
    )
    .context("Cannot start monitor")?;

    let layout = config.row_layout();
    let delay = Duration::from_secs_f64(config.delay.unwrap_or(DEFAULT_DELAY));
    let max_iter = config.max_iter.unwrap_or(0);
    info!(
        "Monitoring with screen {} ({}), delay {:?}",
        screen,
        monitor.screen().name(),
        delay
    );

    {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", monitor.header(&layout)).context("Cannot write to stdout")?;
    }

    // baseline samples
    monitor.run_cycle();

    let mut ticker = interval_at(Instant::now() + FIRST_INTERVAL, delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut printed: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }

        let dead = monitor.run_cycle();
        if dead > 0 {
            debug!("{} task(s) exited", dead);
        }

        let mut out = io::stdout().lock();
        for row in monitor.rows() {
            writeln!(out, "{}", monitor.format_row(row, &layout))
                .context("Cannot write to stdout")?;
        }
        out.flush().context("Cannot write to stdout")?;

        printed += 1;
        if max_iter > 0 && printed >= max_iter {
            break;
        }
    }

    monitor.shutdown();
    info!("Stopped after {} refresh(es)", printed);
    Ok(())
}
