// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic scan loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::{ScanClient, SnapshotHandler};

/// Runs [`ScanClient::scan_cycle`] at a fixed period in its own task.
///
/// The client is moved into the task, which is the only place requests are
/// issued from. A cycle that overruns the period delays the next one instead
/// of bursting.
pub struct Poller {
    task: JoinHandle<ScanClient>,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Poller {
    /// Start polling. The first cycle runs immediately.
    ///
    /// # Errors
    ///
    /// Fails on a zero `interval`; the client is dropped in that case.
    pub fn spawn<H>(mut client: ScanClient, interval: Duration, mut handler: H) -> Result<Self>
    where
        H: SnapshotHandler + 'static,
    {
        if interval.is_zero() {
            anyhow::bail!("Scan interval must be greater than zero");
        }

        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());

        let task_running = running.clone();
        let task_wake = wake.clone();
        let task = tokio::spawn(async move {
            info!("Starting scan loop every {:?}", interval);
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while task_running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = task_wake.notified() => {}
                }
                if !task_running.load(Ordering::SeqCst) {
                    break;
                }
                let snapshot = client.scan_cycle(Some(&mut handler)).await;
                debug!(
                    "Scan cycle {} finished with {} values",
                    snapshot.cycle(),
                    snapshot.len()
                );
            }

            client.disconnect().await;
            info!("Scan loop stopped after {} cycles", client.cycles());
            client
        });

        Ok(Self {
            task,
            running,
            wake,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Ask the loop to stop after the cycle in progress.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Wait for the loop to end and take the client back, disconnected.
    pub async fn join(self) -> Result<ScanClient> {
        self.task.await.context("Scan loop task failed")
    }
}
