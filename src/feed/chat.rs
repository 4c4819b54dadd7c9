//! Faction chat feed.
//!
//! Wire shape:
//! `{"messages": [{"post_id": "17", "user_id": "42", "message": "hi"}, ...]}`
//! Ids show up both as JSON numbers and as numeric strings.

use super::{Cursor, Extracted, FactionId, FeedAdapter, FeedItem, FeedRequest, FetchMode};
use crate::error::{FetchError, FetchResult};
use serde::{Deserialize, Deserializer};

const METHOD_ALL: &str = "getFactionMessages";
const METHOD_NEW: &str = "getNewFactionMessages";

/// Shown in place of a post whose body came back as null.
const NULL_MESSAGE: &str = "nil";

/// Adapter for the faction chat feed.
#[derive(Debug, Clone)]
pub struct ChatFeed {
    tag: String,
}

impl ChatFeed {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(deserialize_with = "numeric_id")]
    post_id: u64,
    #[serde(deserialize_with = "numeric_id")]
    user_id: u64,
    #[serde(default)]
    message: Option<String>,
}

fn numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl FeedAdapter for ChatFeed {
    fn kind(&self) -> &'static str {
        "chat"
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn build_request(&self, _faction: FactionId, cursor: Cursor) -> FeedRequest {
        match cursor.id() {
            Some(last) => FeedRequest {
                mode: FetchMode::Since(last),
                method: METHOD_NEW,
                params: vec![("last_post".to_string(), last.to_string())],
            },
            None => FeedRequest {
                mode: FetchMode::Full,
                method: METHOD_ALL,
                params: Vec::new(),
            },
        }
    }

    fn extract(&self, cursor: Cursor, raw: &serde_json::Value) -> FetchResult<Extracted> {
        let response = ChatResponse::deserialize(raw)
            .map_err(|e| FetchError::AdapterDecode(format!("chat messages: {}", e)))?;

        let items = response.messages.into_iter().map(|m| FeedItem {
            item_id: m.post_id,
            source_user_id: m.user_id,
            text: m.message.unwrap_or_else(|| NULL_MESSAGE.to_string()),
        });

        Ok(Extracted::after(cursor, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed() -> ChatFeed {
        ChatFeed::new("FEED")
    }

    #[test]
    fn test_full_request_without_cursor() {
        let req = feed().build_request(FactionId(1000), Cursor::NONE);
        assert_eq!(req.mode, FetchMode::Full);
        assert_eq!(req.method, "getFactionMessages");
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_since_request_with_cursor() {
        let req = feed().build_request(FactionId(1000), Cursor::at(77));
        assert_eq!(req.mode, FetchMode::Since(77));
        assert_eq!(req.method, "getNewFactionMessages");
        assert_eq!(req.params, vec![("last_post".to_string(), "77".to_string())]);
    }

    #[test]
    fn test_extract_mixed_id_encodings() {
        let raw = json!({
            "messages": [
                {"post_id": "5", "user_id": "42", "message": "hello"},
                {"post_id": 9, "user_id": 43, "message": "world"},
            ]
        });
        let out = feed().extract(Cursor::at(3), &raw).unwrap();
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.items[0].source_user_id, 42);
        assert_eq!(out.items[1].text, "world");
        assert_eq!(out.next, Cursor::at(9));
    }

    #[test]
    fn test_empty_messages_is_no_activity() {
        let raw = json!({"messages": []});
        let out = feed().extract(Cursor::at(3), &raw).unwrap();
        assert!(out.items.is_empty());
        assert_eq!(out.next, Cursor::at(3));
    }

    #[test]
    fn test_null_message_is_relayed_as_nil() {
        let raw = json!({"messages": [
            {"post_id": 4, "user_id": 1, "message": null},
            {"post_id": 5, "user_id": 1, "message": ""}
        ]});
        let out = feed().extract(Cursor::NONE, &raw).unwrap();
        assert_eq!(out.items[0].text, "nil");
        assert_eq!(out.items[1].text, "");
    }

    #[test]
    fn test_missing_messages_is_decode_error() {
        let raw = json!({"result": true});
        let err = feed().extract(Cursor::NONE, &raw).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_non_numeric_id_is_decode_error() {
        let raw = json!({"messages": [{"post_id": "abc", "user_id": 1}]});
        assert!(feed().extract(Cursor::NONE, &raw).unwrap_err().is_decode());
    }
}
