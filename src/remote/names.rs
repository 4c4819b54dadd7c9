//! Player name lookups.

use super::ApiCall;
use crate::dispatch::NameResolver;
use crate::state::DashMapExt;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const METHOD_PROFILE: &str = "getProfileData";

/// Resolves user ids to names, remembering every answer for the life of the
/// process. Names learned from member lists are fed in via [`remember`].
///
/// [`remember`]: NameCache::remember
pub struct NameCache {
    api: Arc<dyn ApiCall>,
    names: DashMap<u64, String>,
}

impl NameCache {
    pub fn new(api: Arc<dyn ApiCall>) -> Self {
        Self {
            api,
            names: DashMap::new(),
        }
    }

    pub fn remember(&self, user_id: u64, name: &str) {
        if !name.is_empty() {
            self.names.insert(user_id, name.to_string());
        }
    }

    pub fn cached(&self, user_id: u64) -> Option<String> {
        self.names.get_cloned(&user_id)
    }
}

/// `{"profile_data": {"user_data": {"name": "..."}}}`
fn profile_name(body: &Value) -> Option<&str> {
    body.get("profile_data")?
        .get("user_data")?
        .get("name")?
        .as_str()
}

#[async_trait]
impl NameResolver for NameCache {
    async fn resolve_name(&self, user_id: u64) -> String {
        if let Some(name) = self.cached(user_id) {
            return name;
        }

        let params = [("target_user_id".to_string(), user_id.to_string())];
        match self.api.call(None, METHOD_PROFILE, &params).await {
            Ok(body) => match profile_name(&body) {
                Some(name) => {
                    self.remember(user_id, name);
                    name.to_string()
                }
                None => {
                    debug!(user_id, "Profile has no name");
                    user_id.to_string()
                }
            },
            Err(e) => {
                debug!(user_id, error = %e, "Name lookup failed");
                user_id.to_string()
            }
        }
    }
}
