//! Process-wide "last seen" positions.
//!
//! Written by the dispatcher after each relayed batch, read by anything that
//! wants to report a feed's position without polling (e.g. the `!chat`
//! status command).

use super::DashMapExt;
use crate::feed::{Cursor, FactionId, ItemId};
use dashmap::DashMap;
use std::sync::Arc;

/// Writer side, owned by the dispatcher.
#[derive(Clone, Default)]
pub struct LastSeen {
    inner: Arc<DashMap<FactionId, ItemId>>,
}

impl LastSeen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a feed's cursor. Absent cursors and backwards moves are
    /// ignored. The entry API keeps this atomic per faction.
    pub fn publish(&self, faction: FactionId, cursor: Cursor) {
        let Some(id) = cursor.id() else {
            return;
        };
        self.inner
            .entry(faction)
            .and_modify(|last| {
                if id > *last {
                    *last = id;
                }
            })
            .or_insert(id);
    }

    /// Drop a faction's position when its feed is unregistered.
    pub fn forget(&self, faction: FactionId) {
        self.inner.remove(&faction);
    }

    /// Read-only handle for other collaborators.
    pub fn view(&self) -> LastSeenView {
        LastSeenView {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of [`LastSeen`].
#[derive(Clone)]
pub struct LastSeenView {
    inner: Arc<DashMap<FactionId, ItemId>>,
}

impl LastSeenView {
    pub fn last_seen(&self, faction: FactionId) -> Option<ItemId> {
        self.inner.get_cloned(&faction)
    }

    /// Every known position, ordered by faction.
    pub fn snapshot(&self) -> Vec<(FactionId, ItemId)> {
        self.inner.sorted_cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_view() {
        let last = LastSeen::new();
        let view = last.view();
        assert_eq!(view.last_seen(FactionId(1)), None);

        last.publish(FactionId(1), Cursor::at(10));
        assert_eq!(view.last_seen(FactionId(1)), Some(10));

        last.publish(FactionId(1), Cursor::at(4));
        assert_eq!(view.last_seen(FactionId(1)), Some(10));

        last.publish(FactionId(1), Cursor::NONE);
        assert_eq!(view.last_seen(FactionId(1)), Some(10));

        last.publish(FactionId(0), Cursor::at(2));
        assert_eq!(view.snapshot(), vec![(FactionId(0), 2), (FactionId(1), 10)]);
    }

    #[test]
    fn test_forget() {
        let last = LastSeen::new();
        last.publish(FactionId(7), Cursor::at(1));
        last.forget(FactionId(7));
        assert_eq!(last.view().last_seen(FactionId(7)), None);
    }
}
