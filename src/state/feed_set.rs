//! Monitored feeds.
//!
//! The `FeedSet` holds one `MonitoredFeed` record per faction. Each record
//! sits behind its own async mutex: the poller holds it for the whole
//! fetch -> diff -> notify pass of that feed, and subscriber changes take the
//! same lock, so a channel is never added or removed halfway through a notify.

use super::DashMapExt;
use crate::feed::{Cursor, FactionId, FeedAdapter};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One faction's feed: adapter, position and subscribers.
pub struct MonitoredFeed {
    pub faction: FactionId,
    pub adapter: Arc<dyn FeedAdapter>,
    pub cursor: Cursor,
    /// False until the cursor has been initialised against the remote
    /// history. An unprimed feed relays nothing on its first successful poll.
    pub primed: bool,
    /// Lowercased channel names.
    pub channels: BTreeSet<String>,
}

impl MonitoredFeed {
    pub fn new(faction: FactionId, adapter: Arc<dyn FeedAdapter>) -> Self {
        Self {
            faction,
            adapter,
            cursor: Cursor::NONE,
            primed: false,
            channels: BTreeSet::new(),
        }
    }

    /// Add a channel. Returns false if it was already subscribed.
    pub fn subscribe(&mut self, channel: &str) -> bool {
        self.channels.insert(channel.to_ascii_lowercase())
    }

    /// Remove a channel. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, channel: &str) -> bool {
        self.channels.remove(&channel.to_ascii_lowercase())
    }

    /// Subscribers as an owned list, in a stable order.
    pub fn channel_list(&self) -> Vec<String> {
        self.channels.iter().cloned().collect()
    }
}

/// Shared handle to a feed record.
pub type FeedHandle = Arc<Mutex<MonitoredFeed>>;

/// Live collection of monitored feeds keyed by faction.
#[derive(Default)]
pub struct FeedSet {
    feeds: DashMap<FactionId, FeedHandle>,
}

impl FeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feed. Returns the existing handle instead if the faction is
    /// already monitored.
    pub fn insert(&self, feed: MonitoredFeed) -> Result<FeedHandle, FeedHandle> {
        use dashmap::mapref::entry::Entry;
        match self.feeds.entry(feed.faction) {
            Entry::Occupied(existing) => Err(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                let handle = Arc::new(Mutex::new(feed));
                slot.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    pub fn remove(&self, faction: FactionId) -> Option<FeedHandle> {
        self.feeds.remove(&faction).map(|(_, handle)| handle)
    }

    /// Clone the handle for `faction` (the shard guard drops immediately).
    pub fn get(&self, faction: FactionId) -> Option<FeedHandle> {
        self.feeds.get_cloned(&faction)
    }

    pub fn contains(&self, faction: FactionId) -> bool {
        self.feeds.contains_key(&faction)
    }

    /// Stable snapshot of every feed, for one poll cycle.
    ///
    /// Handles are cloned out so no shard lock is held while the caller
    /// awaits. Feeds added or removed after this call are only seen by the
    /// next snapshot.
    pub fn snapshot(&self) -> Vec<FeedHandle> {
        self.feeds
            .sorted_cloned()
            .into_iter()
            .map(|(_, handle)| handle)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ChatFeed;

    fn feed(id: u64) -> MonitoredFeed {
        MonitoredFeed::new(FactionId(id), Arc::new(ChatFeed::new("FEED")))
    }

    #[test]
    fn test_subscribe_is_case_insensitive() {
        let mut f = feed(1);
        assert!(f.subscribe("#Faction"));
        assert!(!f.subscribe("#faction"));
        assert_eq!(f.channel_list(), vec!["#faction".to_string()]);
        assert!(f.unsubscribe("#FACTION"));
        assert!(f.channels.is_empty());
    }

    #[test]
    fn test_insert_rejects_duplicate_faction() {
        let set = FeedSet::new();
        assert!(set.insert(feed(1)).is_ok());
        assert!(set.insert(feed(1)).is_err());
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable() {
        let set = FeedSet::new();
        set.insert(feed(2)).ok();
        set.insert(feed(1)).ok();

        let snap = set.snapshot();
        set.insert(feed(3)).ok();
        set.remove(FactionId(2));

        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].lock().await.faction, FactionId(1));
        assert_eq!(snap[1].lock().await.faction, FactionId(2));
        assert_eq!(set.snapshot().len(), 2);
        assert!(set.contains(FactionId(3)));
        assert!(!set.contains(FactionId(2)));
    }
}
