//! Fetcher control loop (spec §4.6): single control loop with adaptive
//! pacing over two independent feed cadences. Grounded on the original
//! Python `Fetcher.run`/`store_snapshot`/`sleep`
//! (`original_source/zet/fetcher/fetcher.py`).

use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use transit_core::wire::{FrameKind, PushFrame};

use crate::archive::ArchiveStore;
use crate::config::Config;
use crate::error::FetcherError;
use crate::push_server::PushServer;
use crate::realtime::{process_gtfs, RealtimeSnapshot};
use crate::static_snapshot::{process_static, StaticSnapshot};

const SHORT_DELAY: f64 = 1.0;

pub struct Fetcher {
    config: Config,
    client: reqwest::Client,
    push_server: PushServer,
    archive: ArchiveStore,
    running: Arc<AtomicBool>,
    current_realtime: Option<RealtimeSnapshot>,
    last_static_fetch: Option<chrono::DateTime<Utc>>,
}

impl Fetcher {
    pub async fn new(
        config: Config,
        push_server: PushServer,
        running: Arc<AtomicBool>,
    ) -> Result<Self, FetcherError> {
        let client = reqwest::Client::builder()
            .user_agent("transit-fetcher/0.1")
            .build()?;
        let archive = ArchiveStore::open(&config.dir).await?;
        Ok(Self {
            config,
            client,
            push_server,
            archive,
            running,
            current_realtime: None,
            last_static_fetch: None,
        })
    }

    pub async fn run(mut self) -> Result<(), FetcherError> {
        tracing::info!(
            realtime_url = %self.config.realtime_url,
            "starting to fetch with adaptive timing"
        );

        let long_delay = (self.config.realtime_dt - 1.0).max(1.0);
        let mut current_delay = SHORT_DELAY;

        while self.running.load(Ordering::Relaxed) {
            match self.fetch_url(&self.config.realtime_url.clone()).await {
                Ok(data) => {
                    let new_snapshot = self.store_realtime_snapshot(data).await?;
                    current_delay = if new_snapshot { long_delay } else { SHORT_DELAY };
                }
                Err(e) => {
                    tracing::error!(error = %e, "no realtime data fetched, skipping snapshot");
                    current_delay = (current_delay * 2.0).min(60.0);
                }
            }

            let now = Utc::now();
            let due = match self.last_static_fetch {
                None => true,
                Some(last) => (now - last).num_milliseconds() as f64 / 1000.0 > self.config.static_dt,
            };
            if due {
                self.last_static_fetch = Some(now);
                match self.fetch_url(&self.config.static_url.clone()).await {
                    Ok(data) => {
                        self.store_static_snapshot(data).await?;
                        current_delay = 0.0;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "no static data fetched");
                    }
                }
            }

            self.sleep(current_delay).await;
        }

        self.archive.close().await;
        tracing::info!("archive closed, fetcher shut down");
        Ok(())
    }

    async fn fetch_url(&self, url: &str) -> Result<Bytes, FetcherError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetcherError::NetworkMessage(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }

    /// Returns true if the realtime payload was new (not a byte-identical
    /// repeat of the previously stored one).
    async fn store_realtime_snapshot(&mut self, raw_data: Bytes) -> Result<bool, FetcherError> {
        let fetched_at = Utc::now();

        let same_as_previous = self
            .current_realtime
            .as_ref()
            .is_some_and(|prev| prev.raw_bytes == raw_data);

        let (snapshot, gzipped_for_archive) = if same_as_previous {
            let prev = self.current_realtime.clone().expect("checked above");
            (prev, Bytes::new())
        } else {
            let snapshot = process_gtfs(raw_data, fetched_at);
            if snapshot.is_valid() {
                let frame = PushFrame::new(
                    FrameKind::Realtime,
                    fetched_at.timestamp_millis() as f64 / 1000.0,
                    &snapshot.gzipped_bytes,
                );
                self.push_server
                    .publish(FrameKind::Realtime.topic(), frame.to_text()?, 10)
                    .await?;
            }
            let gzipped = snapshot.gzipped_bytes.clone();
            self.current_realtime = Some(snapshot.clone());
            (snapshot, gzipped)
        };

        self.archive
            .insert_realtime(
                fetched_at,
                snapshot.snapshot_at,
                &gzipped_for_archive,
                !same_as_previous,
            )
            .await?;

        if same_as_previous {
            tracing::info!(fetched_at = %fetched_at, "fetched realtime data (same as previous)");
        } else {
            tracing::info!(
                fetched_at = %fetched_at,
                snapshot_at = snapshot.snapshot_at,
                raw_len = snapshot.raw_bytes.len(),
                gzipped_len = snapshot.gzipped_bytes.len(),
                "fetched new realtime data"
            );
        }

        Ok(!same_as_previous)
    }

    async fn store_static_snapshot(&mut self, raw_data: Bytes) -> Result<(), FetcherError> {
        let fetched_at = Utc::now();
        let snapshot: StaticSnapshot = process_static(raw_data, fetched_at);

        self.archive
            .insert_static(fetched_at, &snapshot.gzipped_bytes, snapshot.calendar_date)
            .await?;

        if snapshot.is_valid() {
            let frame = PushFrame::new(
                FrameKind::Static,
                fetched_at.timestamp_millis() as f64 / 1000.0,
                &snapshot.gzipped_bytes,
            );
            self.push_server
                .publish(FrameKind::Static.topic(), frame.to_text()?, 3)
                .await?;
        }

        tracing::info!(
            calendar_date = %snapshot.calendar_date,
            valid = snapshot.is_valid(),
            "fetched static data"
        );
        Ok(())
    }

    /// Sleep for `delay` seconds, checking the shutdown flag once a second.
    async fn sleep(&self, delay: f64) {
        let whole_seconds = delay as u64;
        for _ in 0..whole_seconds {
            if !self.running.load(Ordering::Relaxed) {
                return;
            }
            tokio::time::sleep(StdDuration::from_secs(1)).await;
        }
        let fractional = delay - whole_seconds as f64;
        if self.running.load(Ordering::Relaxed) && fractional > 0.0 {
            tokio::time::sleep(StdDuration::from_secs_f64(fractional)).await;
        }
    }
}
