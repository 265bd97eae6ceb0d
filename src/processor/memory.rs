//! Background memory sampling for monitored operations.
//!
//! One sampler runs per pipeline run. It polls the resident memory of the
//! current process on an interval and retains only the running maximum,
//! which is reported in the run metadata. The streaming path additionally
//! polls the current reading at chunk boundaries to drive its high-water
//! reclamation, so the reading must track this process, not the machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Resident memory of the current process in MB, read synchronously
pub fn current_used_mb() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map_or(0, |p| p.memory() / BYTES_PER_MB)
}

/// Handle to a running background memory sampler
#[derive(Debug)]
pub struct MemorySampler {
    peak_mb: Arc<AtomicU64>,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MemorySampler {
    /// Start sampling at the given interval
    pub fn start(interval: Duration) -> Self {
        let peak_mb = Arc::new(AtomicU64::new(0));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let peak = peak_mb.clone();
        let handle = tokio::spawn(async move {
            let pid = match sysinfo::get_current_pid() {
                Ok(pid) => pid,
                Err(e) => {
                    debug!("Memory sampler disabled: {}", e);
                    return;
                }
            };
            let mut system = System::new();
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                        if let Some(process) = system.process(pid) {
                            peak.fetch_max(process.memory() / BYTES_PER_MB, Ordering::Relaxed);
                        }
                    }
                }
            }
        });

        Self {
            peak_mb,
            stop_tx,
            handle,
        }
    }

    /// Highest reading observed so far, in MB
    pub fn peak_mb(&self) -> u64 {
        self.peak_mb.load(Ordering::Relaxed)
    }

    /// Stop the sampler and return the highest observed reading in MB
    pub async fn stop(self) -> u64 {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            debug!("Memory sampler task ended abnormally: {}", e);
        }
        // Take one final reading so very short runs still report something
        let final_reading = current_used_mb();
        self.peak_mb.load(Ordering::Relaxed).max(final_reading)
    }
}
