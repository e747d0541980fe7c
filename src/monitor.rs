use crate::composer::{MessageComposer, TextGenerator};
use crate::delivery::DeliveryManager;
use crate::grailed::{ListingSource, Messenger, SessionProvider, fetch_all};
use crate::metrics;
use crate::models::Listing;
use crate::store::{SeenStore, SnapshotBackend};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashSet, time::Duration, time::Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info};

/// Delivers one composed message; `true` only when the marketplace accepted it.
pub trait Deliverer {
    async fn deliver(&mut self, listing: &Listing, text: &str) -> bool;
}

impl<S: SessionProvider, M: Messenger> Deliverer for DeliveryManager<S, M> {
    async fn deliver(&mut self, listing: &Listing, text: &str) -> bool {
        self.send(listing, text).await
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct MonitorError {
    stage: &'static str,
    message: String,
}

impl MonitorError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub page_delay: Duration,
}

impl MonitorSettings {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            page_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub fetched: usize,
    pub new: usize,
    pub sent: usize,
    pub failed: usize,
    pub elapsed_ms: u128,
    pub finished_at: DateTime<Utc>,
}

pub struct Monitor<L, G, D, B> {
    source: L,
    composer: MessageComposer<G>,
    delivery: D,
    store: SeenStore<B>,
    settings: MonitorSettings,
    cycle: u64,
}

impl<L, G, D, B> Monitor<L, G, D, B>
where
    L: ListingSource,
    G: TextGenerator,
    D: Deliverer,
    B: SnapshotBackend,
{
    pub fn new(
        source: L,
        composer: MessageComposer<G>,
        delivery: D,
        store: SeenStore<B>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            composer,
            delivery,
            store,
            settings,
            cycle: 0,
        }
    }

    /// Marks every currently listed item as seen without messaging anyone.
    pub async fn baseline(&mut self) -> Result<usize, MonitorError> {
        info!(target = "lowball.monitor", "performing initial scan to mark existing listings...");
        let listings = fetch_all(&self.source, self.settings.page_delay).await;
        let mut marked = 0;
        for listing in &listings {
            if self.store.mark_seen(listing.id.as_str()) {
                info!(
                    target = "lowball.monitor",
                    listing_id = %listing.id,
                    "marking initial listing as seen: {} - ${}",
                    listing.title,
                    listing.price
                );
                marked += 1;
            }
        }
        self.store
            .flush()
            .map_err(|err| MonitorError::new("flush", err.to_string()))?;
        info!(
            target = "lowball.monitor",
            marked,
            total_seen = self.store.len(),
            "initial scan complete"
        );
        Ok(marked)
    }

    /// One poll → diff → act → persist pass.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, MonitorError> {
        self.cycle += 1;
        let started = Instant::now();
        let listings = fetch_all(&self.source, self.settings.page_delay).await;

        let mut handled = HashSet::new();
        let (mut new, mut sent, mut failed) = (0, 0, 0);
        for listing in &listings {
            if self.store.contains(&listing.id) || !handled.insert(listing.id.as_str()) {
                continue;
            }
            new += 1;
            metrics::listing_new(&listing.id);
            info!(
                target = "lowball.monitor",
                listing_id = %listing.id,
                "new listing found: {} - ${}",
                listing.title,
                listing.price
            );

            let text = self.composer.compose(listing).await;
            if self.delivery.deliver(listing, &text).await {
                self.store.mark_seen(listing.id.as_str());
                sent += 1;
            } else {
                failed += 1;
            }
        }

        self.store
            .flush()
            .map_err(|err| MonitorError::new("flush", err.to_string()))?;

        let elapsed_ms = started.elapsed().as_millis();
        metrics::cycle_completed(self.cycle, elapsed_ms);
        Ok(CycleReport {
            cycle: self.cycle,
            fetched: listings.len(),
            new,
            sent,
            failed,
            elapsed_ms,
            finished_at: Utc::now(),
        })
    }

    /// Baseline once, then cycle until the process is killed.
    pub async fn run(mut self) {
        info!(target = "lowball.monitor", "starting listing monitor...");
        if let Err(err) = self.baseline().await {
            error!(target = "lowball.monitor", error = %err, "error during initial scan");
        }

        loop {
            match self.run_cycle().await {
                Ok(report) => info!(
                    target = "lowball.monitor",
                    cycle = report.cycle,
                    fetched = report.fetched,
                    new = report.new,
                    sent = report.sent,
                    failed = report.failed,
                    elapsed_ms = report.elapsed_ms as u64,
                    "monitoring complete, waiting {} seconds...",
                    self.settings.interval.as_secs()
                ),
                Err(err) => {
                    error!(target = "lowball.monitor", error = %err, "error in monitoring loop")
                }
            }
            sleep(self.settings.interval).await;
        }
    }

    #[cfg(test)]
    fn store(&self) -> &SeenStore<B> {
        &self.store
    }
}
