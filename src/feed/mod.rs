//! Feed adapters.
//!
//! A feed is a remote, append-only list of items scoped to one faction.
//! The poller knows nothing about any particular feed kind: it asks a
//! [`FeedAdapter`] for a request, hands that to the [`Transport`], and asks
//! the adapter again to turn the raw response into new items plus the next
//! [`Cursor`].

mod chat;

pub use chat::ChatFeed;

use crate::error::FetchResult;
use async_trait::async_trait;
use std::fmt;

/// Faction identifier on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactionId(pub u64);

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single feed item. Ordered by arrival.
pub type ItemId = u64;

/// Forward-only marker of the last item delivered for a feed.
///
/// `Cursor::NONE` means the feed has no known position yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor(Option<ItemId>);

impl Cursor {
    pub const NONE: Cursor = Cursor(None);

    pub fn at(id: ItemId) -> Self {
        Self(Some(id))
    }

    pub fn id(&self) -> Option<ItemId> {
        self.0
    }

    /// Whether `id` lies strictly after this cursor.
    pub fn is_before(&self, id: ItemId) -> bool {
        self.0.is_none_or(|last| id > last)
    }

    /// Move forward to `other`. Never moves backwards.
    pub fn advance(&mut self, other: Cursor) {
        if let Some(next) = other.0
            && self.is_before(next)
        {
            self.0 = Some(next);
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{}", id),
            None => f.write_str("none"),
        }
    }
}

/// One unit of feed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub item_id: ItemId,
    pub source_user_id: u64,
    pub text: String,
}

/// Which kind of fetch a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Everything the remote is willing to return (bounded by its page size).
    Full,
    /// Only items strictly after the given id.
    Since(ItemId),
}

/// Request descriptor handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub mode: FetchMode,
    /// Remote API method name.
    pub method: &'static str,
    pub params: Vec<(String, String)>,
}

/// Output of [`FeedAdapter::extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// New items in arrival order. Empty when nothing is new.
    pub items: Vec<FeedItem>,
    /// Cursor after these items, or the previous cursor if `items` is empty.
    pub next: Cursor,
}

impl Extracted {
    /// Build from raw items, dropping anything at or before `cursor`.
    pub fn after(cursor: Cursor, raw: impl IntoIterator<Item = FeedItem>) -> Self {
        let items: Vec<FeedItem> = raw
            .into_iter()
            .filter(|item| cursor.is_before(item.item_id))
            .collect();
        let mut next = cursor;
        if let Some(max) = items.iter().map(|i| i.item_id).max() {
            next.advance(Cursor::at(max));
        }
        Self { items, next }
    }
}

/// Per-feed-kind fetch and diff strategy.
pub trait FeedAdapter: Send + Sync {
    /// Short name of the feed kind, used in logs and metrics.
    fn kind(&self) -> &'static str;

    /// Tag shown in front of relayed lines, e.g. `FEED` in `[FEED] name: text`.
    fn tag(&self) -> &str;

    /// Build the request for the next poll. A full fetch is only used when
    /// the cursor is absent.
    fn build_request(&self, faction: FactionId, cursor: Cursor) -> FeedRequest;

    /// Extract the items after `cursor` from a raw response.
    fn extract(&self, cursor: Cursor, raw: &serde_json::Value) -> FetchResult<Extracted>;
}

/// Network access to the remote service.
///
/// Implementations must bound each call with a timeout and report it as
/// [`FetchError::Timeout`](crate::error::FetchError::Timeout).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        faction: FactionId,
        request: &FeedRequest,
    ) -> FetchResult<serde_json::Value>;
}
