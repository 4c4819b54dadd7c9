//! Game API collaborators.
//!
//! - [`ApiClient`]: HTTP transport, also the poller's [`Transport`](crate::feed::Transport)
//! - [`NameCache`]: user id -> player name
//! - [`MemberCache`]: per-faction member lists with a TTL

mod client;
mod members;
mod names;

pub use client::{ApiCall, ApiClient};
pub use members::MemberCache;
pub use names::NameCache;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`ApiCall`] for cache tests.

    use super::ApiCall;
    use crate::error::{FetchError, FetchResult};
    use crate::feed::FactionId;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct ScriptedApi {
        responses: Mutex<HashMap<String, serde_json::Value>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedApi {
        pub fn respond(&self, method: &str, body: serde_json::Value) {
            self.responses
                .lock()
                .unwrap()
                .insert(method.to_string(), body);
        }

        /// Make `method` fail from now on.
        pub fn fail(&self, method: &str) {
            self.responses.lock().unwrap().remove(method);
        }

        pub fn calls(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .get(method)
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl ApiCall for ScriptedApi {
        async fn call(
            &self,
            _faction: Option<FactionId>,
            method: &str,
            _params: &[(String, String)],
        ) -> FetchResult<serde_json::Value> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default() += 1;
            self.responses
                .lock()
                .unwrap()
                .get(method)
                .cloned()
                .ok_or_else(|| FetchError::Network("no scripted response".into()))
        }
    }
}
