//! Cached faction member lists.
//!
//! Member lists are fetched at most once per TTL per faction. When a refresh
//! fails the previous list is served instead: a stale answer is expected
//! here and callers treat unknown members leniently anyway.

use super::{ApiCall, NameCache};
use crate::confirm::{MembershipSnapshot, MembershipSource};
use crate::error::{FetchError, FetchResult};
use crate::feed::FactionId;
use crate::state::DashMapExt;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const METHOD_MEMBERS: &str = "getFactionMembers";

#[derive(Clone)]
struct CachedMembers {
    snapshot: MembershipSnapshot,
    fetched_at: Instant,
}

pub struct MemberCache {
    api: Arc<dyn ApiCall>,
    names: Arc<NameCache>,
    ttl: Duration,
    cache: DashMap<FactionId, CachedMembers>,
}

/// `{"members": {"42": {"permission_level": "2", "name": "bob"}, ...}}`
#[derive(Debug, Deserialize)]
struct MembersResponse {
    members: HashMap<String, MemberEntry>,
}

#[derive(Debug, Deserialize)]
struct MemberEntry {
    #[serde(default)]
    permission_level: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
}

fn level_of(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

impl MemberCache {
    pub fn new(api: Arc<dyn ApiCall>, names: Arc<NameCache>, ttl: Duration) -> Self {
        Self {
            api,
            names,
            ttl,
            cache: DashMap::new(),
        }
    }

    async fn refresh(&self, faction: FactionId) -> FetchResult<MembershipSnapshot> {
        let body = self.api.call(Some(faction), METHOD_MEMBERS, &[]).await?;
        let response = MembersResponse::deserialize(&body)
            .map_err(|e| FetchError::AdapterDecode(format!("faction members: {}", e)))?;

        let mut snapshot = MembershipSnapshot::with_capacity(response.members.len());
        for (id, entry) in response.members {
            let Ok(user_id) = id.trim().parse::<u64>() else {
                debug!(faction = %faction, id = %id, "Skipping member with non-numeric id");
                continue;
            };
            if let Some(name) = &entry.name {
                self.names.remember(user_id, name);
            }
            snapshot.insert(user_id, level_of(entry.permission_level.as_ref()));
        }

        self.cache.insert(
            faction,
            CachedMembers {
                snapshot: snapshot.clone(),
                fetched_at: Instant::now(),
            },
        );
        debug!(faction = %faction, members = snapshot.len(), "Member list refreshed");
        Ok(snapshot)
    }
}

#[async_trait]
impl MembershipSource for MemberCache {
    async fn members(&self, faction: FactionId) -> FetchResult<MembershipSnapshot> {
        let cached = self.cache.get_cloned(&faction);

        if let Some(cached) = &cached
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(cached.snapshot.clone());
        }

        match self.refresh(faction).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => match cached {
                Some(stale) => {
                    warn!(faction = %faction, error = %e, "Member refresh failed, using stale list");
                    Ok(stale.snapshot)
                }
                None => Err(e),
            },
        }
    }
}
