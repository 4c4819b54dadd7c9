//! State management module.
//!
//! Contains the monitored feed set and the shared last-seen positions.

mod dashmap_ext;
mod feed_set;
mod last_seen;

pub use dashmap_ext::DashMapExt;
pub use feed_set::{FeedHandle, FeedSet, MonitoredFeed};
pub use last_seen::{LastSeen, LastSeenView};
