//! Feed poller.
//!
//! One background task owns the [`FeedSet`] and wakes up on a fixed
//! interval. Each wake-up is a poll cycle: every feed in a snapshot of the
//! set is fetched, diffed against its cursor and handed to the dispatcher.
//! Feeds are polled concurrently within a cycle; cycles never overlap, since
//! the next tick is only awaited after the current cycle returns and missed
//! ticks are skipped.
//!
//! A feed that fails keeps its cursor and is simply tried again next cycle.

use crate::dispatch::{Batch, NotificationDispatcher};
use crate::error::{FetchError, FetchResult};
use crate::feed::{Cursor, FactionId, FeedAdapter, FeedRequest, Transport};
use crate::state::{FeedHandle, FeedSet, LastSeenView, MonitoredFeed};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Feeds polled successfully.
    pub polled: usize,
    /// Feeds whose fetch or decode failed.
    pub failed: usize,
    /// Items relayed across all feeds.
    pub relayed: usize,
}

pub struct Poller {
    feeds: FeedSet,
    transport: Arc<dyn Transport>,
    dispatcher: NotificationDispatcher,
    interval: Duration,
    fetch_timeout: Duration,
}

impl Poller {
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatcher: NotificationDispatcher,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            feeds: FeedSet::new(),
            transport,
            dispatcher,
            interval,
            fetch_timeout,
        }
    }

    /// Read-only view of the last relayed position per faction.
    pub fn last_seen(&self) -> LastSeenView {
        self.dispatcher.last_seen().view()
    }

    pub fn is_monitored(&self, faction: FactionId) -> bool {
        self.feeds.contains(faction)
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Start monitoring a faction.
    ///
    /// Looks up the newest existing item first so that history is never
    /// replayed. If that lookup fails the feed is registered anyway and gets
    /// primed by the first successful poll instead. Adding a faction that is
    /// already monitored only merges in the channels.
    pub async fn add_feed(
        &self,
        faction: FactionId,
        adapter: Arc<dyn FeedAdapter>,
        channels: &[String],
    ) -> bool {
        let mut feed = MonitoredFeed::new(faction, adapter);
        for channel in channels {
            feed.subscribe(channel);
        }

        let handle = match self.feeds.insert(feed) {
            Ok(handle) => handle,
            Err(existing) => {
                let mut feed = existing.lock().await;
                for channel in channels {
                    feed.subscribe(channel);
                }
                debug!(faction = %faction, "Feed already monitored, merged channels");
                return false;
            }
        };

        self.start_feed(&handle).await;
        crate::metrics::set_monitored_feeds(self.feeds.len());
        true
    }

    /// Prime a freshly inserted feed. A poll cycle may have taken the lock
    /// first and primed it already, in which case there is nothing to do.
    async fn start_feed(&self, handle: &FeedHandle) {
        let mut feed = handle.lock().await;
        if feed.primed {
            debug!(faction = %feed.faction, "Feed primed by a poll cycle before start");
            return;
        }
        match self.prime(&mut feed).await {
            Ok(()) => {
                info!(
                    faction = %feed.faction,
                    kind = feed.adapter.kind(),
                    cursor = %feed.cursor,
                    channels = feed.channels.len(),
                    "Monitoring feed"
                );
            }
            Err(e) => {
                warn!(
                    faction = %feed.faction,
                    error = %e,
                    "Could not initialise feed position, will prime on next poll"
                );
            }
        }
    }

    /// Stop monitoring a faction.
    pub fn remove_feed(&self, faction: FactionId) -> bool {
        let removed = self.feeds.remove(faction).is_some();
        if removed {
            self.dispatcher.last_seen().forget(faction);
            crate::metrics::set_monitored_feeds(self.feeds.len());
            info!(faction = %faction, "Stopped monitoring feed");
        }
        removed
    }

    /// Subscribe a channel to a monitored faction.
    ///
    /// Returns false if the faction is not monitored or the channel was
    /// already subscribed.
    pub async fn add_channel(&self, faction: FactionId, channel: &str) -> bool {
        let Some(handle) = self.feeds.get(faction) else {
            return false;
        };
        handle.lock().await.subscribe(channel)
    }

    /// Unsubscribe a channel. Returns true if the feed now has no channels.
    pub async fn remove_channel(&self, faction: FactionId, channel: &str) -> Option<bool> {
        let handle = self.feeds.get(faction)?;
        let mut feed = handle.lock().await;
        feed.unsubscribe(channel);
        Some(feed.channels.is_empty())
    }

    /// Current subscribers of a faction.
    pub async fn channels(&self, faction: FactionId) -> Option<Vec<String>> {
        let handle = self.feeds.get(faction)?;
        let channels = handle.lock().await.channel_list();
        Some(channels)
    }

    /// Run one poll cycle over a snapshot of the feed set.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let snapshot = self.feeds.snapshot();

        let results = join_all(snapshot.iter().map(|handle| self.poll_feed(handle))).await;

        let mut report = CycleReport::default();
        for result in results {
            match result {
                Ok(relayed) => {
                    report.polled += 1;
                    report.relayed += relayed;
                }
                Err(_) => report.failed += 1,
            }
        }

        crate::metrics::record_cycle(started.elapsed().as_secs_f64());
        report
    }

    /// Run cycles forever on the configured interval.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; feeds were just primed.
        interval.tick().await;

        loop {
            interval.tick().await;
            let report = self.run_cycle().await;
            if report.failed > 0 {
                warn!(
                    polled = report.polled,
                    failed = report.failed,
                    relayed = report.relayed,
                    "Poll cycle finished with errors"
                );
            } else {
                debug!(
                    polled = report.polled,
                    relayed = report.relayed,
                    "Poll cycle finished"
                );
            }
        }
    }

    /// Fetch, diff and notify one feed, holding its record lock throughout.
    async fn poll_feed(&self, handle: &FeedHandle) -> FetchResult<usize> {
        let mut feed = handle.lock().await;
        let faction = feed.faction;
        let kind = feed.adapter.kind();

        let span = info_span!("poll", faction = %faction, kind = kind);
        let result = self.poll_locked(&mut feed).instrument(span).await;

        // Removed while this poll was in flight: drop what it just published.
        if !self.feeds.contains(faction) {
            self.dispatcher.last_seen().forget(faction);
        }

        match &result {
            Ok(_) => crate::metrics::record_poll(kind, "ok"),
            Err(e) if e.is_decode() => {
                crate::metrics::record_poll(kind, e.error_code());
                error!(
                    faction = %faction,
                    kind = kind,
                    error = %e,
                    "Feed response did not decode, remote API may have changed"
                );
            }
            Err(e) => {
                crate::metrics::record_poll(kind, e.error_code());
                warn!(
                    faction = %faction,
                    kind = kind,
                    cursor = %feed.cursor,
                    error = %e,
                    "Feed fetch failed, retrying next cycle"
                );
            }
        }
        result
    }

    async fn poll_locked(&self, feed: &mut MonitoredFeed) -> FetchResult<usize> {
        if !feed.primed {
            self.prime(feed).await?;
            info!(cursor = %feed.cursor, "Primed feed position, backlog skipped");
            return Ok(0);
        }

        let request = feed.adapter.build_request(feed.faction, feed.cursor);
        let raw = self.fetch(feed.faction, &request).await?;
        let extracted = feed.adapter.extract(feed.cursor, &raw)?;

        let channels = feed.channel_list();
        let relayed = self
            .dispatcher
            .notify(Batch {
                faction: feed.faction,
                tag: feed.adapter.tag(),
                channels: &channels,
                items: &extracted.items,
                cursor: extracted.next,
            })
            .await;

        feed.cursor.advance(extracted.next);
        Ok(relayed)
    }

    /// Initialise a feed's cursor to the newest existing item.
    async fn prime(&self, feed: &mut MonitoredFeed) -> FetchResult<()> {
        let request = feed.adapter.build_request(feed.faction, Cursor::NONE);
        let raw = self.fetch(feed.faction, &request).await?;
        let extracted = feed.adapter.extract(Cursor::NONE, &raw)?;

        feed.cursor.advance(extracted.next);
        feed.primed = true;
        self.dispatcher.last_seen().publish(feed.faction, feed.cursor);
        Ok(())
    }

    async fn fetch(
        &self,
        faction: FactionId,
        request: &FeedRequest,
    ) -> FetchResult<serde_json::Value> {
        match tokio::time::timeout(self.fetch_timeout, self.transport.fetch(faction, request)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

/// Spawn the poll loop as a background task.
pub fn spawn_poll_task(poller: Arc<Poller>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            feeds = poller.feed_count(),
            interval_secs = poller.interval.as_secs(),
            "Poller started"
        );
        poller.run().await;
    })
}
