//! Notification dispatch.
//!
//! Turns a feed's new items into display lines, sends them to every
//! subscribed channel, runs the post-delivery hooks on each item and finally
//! publishes the feed's position to [`LastSeen`].

use crate::feed::{Cursor, FactionId, FeedItem};
use crate::state::LastSeen;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Budget for one display line, in bytes. Items are only joined while the
/// joined line stays within it.
pub const MAX_LINE_BYTES: usize = 400;

const ITEM_SEPARATOR: &str = " | ";

/// Outbound text delivery to a chat channel.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn send(&self, channel: &str, text: &str);
}

/// Remote user id -> human readable name.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Never fails; implementations fall back to something printable.
    async fn resolve_name(&self, user_id: u64) -> String;
}

/// What a hook gets to know about the feed an item came from.
pub struct DeliveryContext<'a> {
    pub faction: FactionId,
    pub channels: &'a [String],
}

/// Runs after an item has been delivered to its channels.
#[async_trait]
pub trait DeliveryHook: Send + Sync {
    async fn after_delivery(&self, ctx: &DeliveryContext<'_>, item: &FeedItem);
}

/// One batch of new items from one feed.
pub struct Batch<'a> {
    pub faction: FactionId,
    pub tag: &'a str,
    pub channels: &'a [String],
    pub items: &'a [FeedItem],
    pub cursor: Cursor,
}

pub struct NotificationDispatcher {
    names: Arc<dyn NameResolver>,
    sink: Arc<dyn ChannelSink>,
    hooks: Vec<Arc<dyn DeliveryHook>>,
    last_seen: LastSeen,
    max_items_per_line: Option<usize>,
}

impl NotificationDispatcher {
    pub fn new(
        names: Arc<dyn NameResolver>,
        sink: Arc<dyn ChannelSink>,
        last_seen: LastSeen,
    ) -> Self {
        Self {
            names,
            sink,
            hooks: Vec::new(),
            last_seen,
            max_items_per_line: None,
        }
    }

    /// Join up to `n` consecutive items into one display line.
    pub fn with_max_items_per_line(mut self, n: Option<usize>) -> Self {
        self.max_items_per_line = n.filter(|&n| n > 1);
        self
    }

    /// Register a post-delivery hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn DeliveryHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn last_seen(&self) -> &LastSeen {
        &self.last_seen
    }

    /// Deliver a batch. Returns the number of items relayed.
    ///
    /// An empty batch does nothing at all: no line, no hook, no publish.
    pub async fn notify(&self, batch: Batch<'_>) -> usize {
        if batch.items.is_empty() {
            return 0;
        }

        let ctx = DeliveryContext {
            faction: batch.faction,
            channels: batch.channels,
        };

        let per_line = self.max_items_per_line.unwrap_or(1);
        let prefix = format!("[{}] ", batch.tag);
        let mut parts: Vec<String> = Vec::with_capacity(per_line);
        let mut pending: Vec<&FeedItem> = Vec::with_capacity(per_line);
        let mut line_len = prefix.len();

        for item in batch.items {
            let name = self.names.resolve_name(item.source_user_id).await;
            let part = format!("{}: {}", name, item.text);

            // A joined line never exceeds the byte budget; only a single
            // over-long item may, and the sink splits that one.
            let joined_len = line_len + ITEM_SEPARATOR.len() + part.len();
            if !parts.is_empty() && (parts.len() == per_line || joined_len > MAX_LINE_BYTES) {
                self.deliver_line(&ctx, &prefix, &parts, &pending).await;
                parts.clear();
                pending.clear();
                line_len = prefix.len();
            }

            line_len += if parts.is_empty() {
                part.len()
            } else {
                ITEM_SEPARATOR.len() + part.len()
            };
            parts.push(part);
            pending.push(item);
        }
        if !parts.is_empty() {
            self.deliver_line(&ctx, &prefix, &parts, &pending).await;
        }

        debug!(
            faction = %batch.faction,
            items = batch.items.len(),
            cursor = %batch.cursor,
            "Relayed new items"
        );
        self.last_seen.publish(batch.faction, batch.cursor);
        batch.items.len()
    }

    /// Send one display line to every channel, then run the hooks on the
    /// items it carried.
    async fn deliver_line(
        &self,
        ctx: &DeliveryContext<'_>,
        prefix: &str,
        parts: &[String],
        items: &[&FeedItem],
    ) {
        let line = format!("{}{}", prefix, parts.join(ITEM_SEPARATOR));
        for channel in ctx.channels {
            self.sink.send(channel, &line).await;
        }
        crate::metrics::record_relayed(items.len(), ctx.channels.len());

        for item in items {
            for hook in &self.hooks {
                hook.after_delivery(ctx, item).await;
            }
        }
    }
}
