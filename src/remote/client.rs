//! HTTP client for the game API.
//!
//! Every call is a GET against `{base_url}/api.php` with the method name in
//! `message` and the calling account's credentials alongside. Each faction
//! is read through an account that belongs to it, so calls are routed by
//! faction; calls that are not faction-scoped use the first account.

use crate::config::{FactionConfig, RemoteConfig};
use crate::error::{FetchError, FetchResult};
use crate::feed::{FactionId, FeedRequest, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// A single API call. Implemented by [`ApiClient`] and by test fakes.
#[async_trait]
pub trait ApiCall: Send + Sync {
    /// Call `method` as the account of `faction`, or as any account when
    /// `faction` is `None`.
    async fn call(
        &self,
        faction: Option<FactionId>,
        method: &str,
        params: &[(String, String)],
    ) -> FetchResult<serde_json::Value>;
}

#[derive(Clone)]
struct Credentials {
    user_id: u64,
    auth_token: String,
}

/// reqwest-backed API client.
pub struct ApiClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    accounts: HashMap<FactionId, Credentials>,
    default_account: Option<Credentials>,
}

impl ApiClient {
    pub fn new(config: &RemoteConfig, factions: &[FactionConfig]) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let accounts: HashMap<FactionId, Credentials> = factions
            .iter()
            .map(|f| {
                (
                    FactionId(f.id),
                    Credentials {
                        user_id: f.user_id,
                        auth_token: f.auth_token.clone(),
                    },
                )
            })
            .collect();
        let default_account = factions.first().map(|f| Credentials {
            user_id: f.user_id,
            auth_token: f.auth_token.clone(),
        });

        Self {
            http,
            endpoint: format!("{}/api.php", config.base_url.trim_end_matches('/')),
            timeout: config.timeout(),
            accounts,
            default_account,
        }
    }

    fn credentials(&self, faction: Option<FactionId>) -> FetchResult<&Credentials> {
        let creds = match faction {
            Some(faction) => self.accounts.get(&faction),
            None => self.default_account.as_ref(),
        };
        creds.ok_or_else(|| match faction {
            Some(faction) => FetchError::Upstream(format!("no account configured for faction {}", faction)),
            None => FetchError::Upstream("no account configured".to_string()),
        })
    }
}

/// Check an API body for an application-level error.
///
/// The API answers `{"result": false, "error": "..."}` when it refuses a
/// request. `"result": null` and a missing `result` are both fine.
pub(crate) fn check_body(body: serde_json::Value) -> FetchResult<serde_json::Value> {
    if body.get("result").and_then(|r| r.as_bool()) == Some(false) {
        let reason = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("request rejected")
            .to_string();
        return Err(FetchError::Upstream(reason));
    }
    Ok(body)
}

#[async_trait]
impl ApiCall for ApiClient {
    async fn call(
        &self,
        faction: Option<FactionId>,
        method: &str,
        params: &[(String, String)],
    ) -> FetchResult<serde_json::Value> {
        let creds = self.credentials(faction)?;

        let mut query: Vec<(&str, String)> = vec![
            ("message", method.to_string()),
            ("user_id", creds.user_id.to_string()),
            ("password", creds.auth_token.clone()),
        ];
        query.extend(params.iter().map(|(k, v)| (k.as_str(), v.clone())));

        debug!(method = %method, faction = ?faction.map(|f| f.0), "API call");

        let request = self.http.get(&self.endpoint).query(&query).send();
        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(FetchError::Timeout),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        check_body(body)
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn fetch(
        &self,
        faction: FactionId,
        request: &FeedRequest,
    ) -> FetchResult<serde_json::Value> {
        self.call(Some(faction), request.method, &request.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ApiClient {
        let remote = RemoteConfig {
            base_url: "https://kg.example.com/".to_string(),
            timeout_secs: 5,
            member_cache_secs: 300,
            user_agent: "test".to_string(),
        };
        let factions = vec![FactionConfig {
            id: 1000,
            name: "Tyrants".to_string(),
            user_id: 7,
            auth_token: "tok".to_string(),
            channels: vec![],
            chat: true,
        }];
        ApiClient::new(&remote, &factions)
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        assert_eq!(client().endpoint, "https://kg.example.com/api.php");
    }

    #[test]
    fn test_credentials_by_faction() {
        let c = client();
        assert_eq!(c.credentials(Some(FactionId(1000))).unwrap().user_id, 7);
        assert_eq!(c.credentials(None).unwrap().user_id, 7);
        assert!(matches!(
            c.credentials(Some(FactionId(1))),
            Err(FetchError::Upstream(_))
        ));
    }

    #[test]
    fn test_check_body_rejections() {
        assert_eq!(
            check_body(json!({"result": false, "error": "invalid_user"})),
            Err(FetchError::Upstream("invalid_user".into()))
        );
        assert!(check_body(json!({"result": false})).is_err());
        assert!(check_body(json!({"result": null, "messages": []})).is_ok());
        assert!(check_body(json!({"messages": []})).is_ok());
    }
}
