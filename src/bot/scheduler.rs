// src/bot/scheduler.rs - Periodic fan-out of catalog creatives to registered destinations

use chrono::{DateTime, Local, TimeZone};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior};

use crate::bot::broadcast::BroadcastPool;
use crate::bot::registry::DestinationRegistry;
use crate::platforms::PlatformConnection;
use crate::types::{ChatId, DrawOutcome, EmptyReason, PlatformError};

/// What happened during one scheduling cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Registry could not be loaded, nothing was attempted
    pub registry_failed: bool,
    pub destinations: usize,
    pub delivered: Vec<ChatId>,
    pub out_of_schedule: usize,
    pub missing_asset: usize,
    pub failed: usize,
}

pub struct BroadcastScheduler {
    pool: Arc<Mutex<BroadcastPool>>,
    registry: Arc<dyn DestinationRegistry>,
    connection: Arc<dyn PlatformConnection>,
    interval: Duration,
    initial_delay: Duration,
    shutdown_signal: Arc<AtomicBool>,
}

impl BroadcastScheduler {
    pub fn new(
        pool: BroadcastPool,
        registry: Arc<dyn DestinationRegistry>,
        connection: Arc<dyn PlatformConnection>,
        interval: Duration,
        initial_delay: Duration,
    ) -> Self {
        Self {
            pool: Arc::new(Mutex::new(pool)),
            registry,
            connection,
            interval,
            initial_delay,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pool(&self) -> Arc<Mutex<BroadcastPool>> {
        Arc::clone(&self.pool)
    }

    /// Run one cycle: every destination draws independently from the shared pool.
    ///
    /// A failed delivery only affects its own destination. A registry failure skips
    /// the whole cycle.
    pub async fn run_cycle<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> CycleReport {
        let mut report = CycleReport::default();

        let destinations = match self.registry.load().await {
            Ok(destinations) => destinations,
            Err(e) => {
                error!("Skipping broadcast cycle, registry load failed: {}", e);
                report.registry_failed = true;
                return report;
            }
        };
        report.destinations = destinations.len();

        for (chat_id, destination) in destinations {
            let outcome = self.pool.lock().await.draw(now);
            let creative = match outcome {
                DrawOutcome::Creative(creative) => creative,
                DrawOutcome::Empty(EmptyReason::OutOfSchedule) => {
                    report.out_of_schedule += 1;
                    continue;
                }
                DrawOutcome::Empty(EmptyReason::EmptyCatalog) => {
                    warn!("Broadcast catalog is empty, nothing to send to {}", chat_id);
                    continue;
                }
            };

            match self
                .connection
                .send_photo(chat_id, &creative.image, &creative.caption, &creative.keyboard())
                .await
            {
                Ok(_) => {
                    info!("Broadcast sent to {} ({})", destination.title, chat_id);
                    report.delivered.push(chat_id);
                }
                Err(PlatformError::AssetNotFound(image)) => {
                    warn!("Broadcast image {} not found, skipping {}", image, chat_id);
                    report.missing_asset += 1;
                }
                Err(e) => {
                    error!("Failed to send broadcast to {} ({}): {}", destination.title, chat_id, e);
                    report.failed += 1;
                }
            }
        }

        if report.out_of_schedule > 0 {
            warn!("Outside broadcast schedule, {} destinations skipped", report.out_of_schedule);
        }

        report
    }

    /// Spawn the recurring broadcast loop
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            info!(
                "Broadcast scheduler started (every {}s, first run in {}s)",
                scheduler.interval.as_secs(),
                scheduler.initial_delay.as_secs()
            );

            let start = tokio::time::Instant::now() + scheduler.initial_delay;
            let mut ticker = tokio::time::interval_at(start, scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if scheduler.shutdown_signal.load(Ordering::Relaxed) {
                    info!("Broadcast scheduler received shutdown signal");
                    break;
                }

                let report = scheduler.run_cycle(&Local::now()).await;
                if !report.registry_failed && report.out_of_schedule < report.destinations {
                    info!(
                        "Broadcast cycle: {}/{} delivered, {} missing assets, {} failed",
                        report.delivered.len(),
                        report.destinations,
                        report.missing_asset,
                        report.failed
                    );
                }
            }
        })
    }

    /// Stop after the current cycle
    pub fn shutdown(&self) {
        self.shutdown_signal.store(true, Ordering::Relaxed);
    }
}
