//! Registration confirmation embedded in faction chat.
//!
//! A player proves they belong to a faction by posting
//! `<bot-nick> confirm <nick> <code>` in that faction's chat. The bot sees
//! the post while relaying, looks the poster up in the faction's member list
//! to decide how far to trust them, and hands everything to the registrar.
//!
//! The member list comes from a cache and is expected to lag behind the live
//! chat. A poster missing from it is treated as a plain member instead of
//! being rejected.

use crate::dispatch::{ChannelSink, DeliveryContext, DeliveryHook};
use crate::error::FetchResult;
use crate::feed::{FactionId, FeedItem};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Remote user id -> faction permission level.
pub type MembershipSnapshot = HashMap<u64, i64>;

/// Source of (possibly stale) faction member lists.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn members(&self, faction: FactionId) -> FetchResult<MembershipSnapshot>;
}

/// The registration store's confirmation entry point.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Returns true if the code matched and the registration was recorded.
    async fn confirm_registration(
        &self,
        faction: FactionId,
        user_id: u64,
        nick: &str,
        level: TrustLevel,
        code: &str,
    ) -> bool;
}

/// Access tier derived from a faction permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrustLevel {
    Member = 1,
    Officer = 2,
    Leader = 3,
    Warmaster = 4,
}

impl TrustLevel {
    /// Used whenever the member list cannot vouch for someone.
    pub const LOWEST: TrustLevel = TrustLevel::Member;

    /// Map a remote permission level. Levels outside the table map to the
    /// lowest tier.
    pub fn from_permission(level: i64) -> Self {
        match level {
            2 => Self::Officer,
            3 => Self::Leader,
            4 => Self::Warmaster,
            _ => Self::LOWEST,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Officer => "officer",
            Self::Leader => "leader",
            Self::Warmaster => "warmaster",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed `confirm` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub requester_user_id: u64,
    pub target_nick: String,
    pub confirmation_code: String,
}

/// What happened to a confirm request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed(TrustLevel),
    Rejected,
}

/// Post-delivery hook that recognises and executes `confirm` requests.
pub struct ConfirmHandler {
    pattern: Regex,
    members: Arc<dyn MembershipSource>,
    registrar: Arc<dyn Registrar>,
    sink: Arc<dyn ChannelSink>,
}

impl ConfirmHandler {
    pub fn new(
        bot_nick: &str,
        members: Arc<dyn MembershipSource>,
        registrar: Arc<dyn Registrar>,
        sink: Arc<dyn ChannelSink>,
    ) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"(?i)^{}\s+confirm\s+([\w\-\[\]\\^{{}}|`]+)\s+(\w+)$",
            regex::escape(bot_nick)
        ))?;
        Ok(Self {
            pattern,
            members,
            registrar,
            sink,
        })
    }

    /// Recognise a confirm request in a feed item.
    pub fn parse(&self, item: &FeedItem) -> Option<ConfirmRequest> {
        let caps = self.pattern.captures(item.text.trim())?;
        Some(ConfirmRequest {
            requester_user_id: item.source_user_id,
            target_nick: caps[1].to_string(),
            confirmation_code: caps[2].to_string(),
        })
    }

    /// Trust level for `user_id` according to the member list.
    pub async fn trust_level(&self, faction: FactionId, user_id: u64) -> TrustLevel {
        match self.members.members(faction).await {
            Ok(snapshot) => match snapshot.get(&user_id) {
                Some(&perm) => TrustLevel::from_permission(perm),
                None => {
                    debug!(faction = %faction, user_id, "Requester not in member list, assuming member");
                    TrustLevel::LOWEST
                }
            },
            Err(e) => {
                warn!(faction = %faction, error = %e, "Member list unavailable, assuming member");
                TrustLevel::LOWEST
            }
        }
    }

    /// Run one confirm request. The registrar is called exactly once.
    pub async fn handle(
        &self,
        faction: FactionId,
        channels: &[String],
        request: &ConfirmRequest,
    ) -> ConfirmOutcome {
        let level = self.trust_level(faction, request.requester_user_id).await;

        let confirmed = self
            .registrar
            .confirm_registration(
                faction,
                request.requester_user_id,
                &request.target_nick,
                level,
                &request.confirmation_code,
            )
            .await;

        crate::metrics::record_confirmation(confirmed);

        if !confirmed {
            // TODO: decide whether a failed confirm should refresh the member cache.
            debug!(
                faction = %faction,
                nick = %request.target_nick,
                "Registration confirm rejected"
            );
            return ConfirmOutcome::Rejected;
        }

        info!(
            faction = %faction,
            nick = %request.target_nick,
            user_id = request.requester_user_id,
            level = %level,
            "Registration confirmed"
        );

        let ack = format!("{}: Thank you for registering.", request.target_nick);
        for channel in channels {
            self.sink.send(channel, &ack).await;
        }

        ConfirmOutcome::Confirmed(level)
    }
}

#[async_trait]
impl DeliveryHook for ConfirmHandler {
    async fn after_delivery(&self, ctx: &DeliveryContext<'_>, item: &FeedItem) {
        if let Some(request) = self.parse(item) {
            self.handle(ctx.faction, ctx.channels, &request).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the confirm, dispatch and poller tests.

    use super::*;
    use crate::error::FetchError;
    use std::sync::Mutex;

    /// Member list that is either a fixed snapshot or always unavailable.
    pub struct FixedMembers(pub Option<MembershipSnapshot>);

    #[async_trait]
    impl MembershipSource for FixedMembers {
        async fn members(&self, _faction: FactionId) -> FetchResult<MembershipSnapshot> {
            self.0.clone().ok_or(FetchError::Timeout)
        }
    }

    /// Registrar that accepts a fixed set of codes and records every call.
    #[derive(Default)]
    pub struct RecordingRegistrar {
        pub accept: Vec<String>,
        pub calls: Mutex<Vec<(FactionId, u64, String, TrustLevel, String)>>,
    }

    impl RecordingRegistrar {
        pub fn accepting(codes: &[&str]) -> Self {
            Self {
                accept: codes.iter().map(|c| c.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<(FactionId, u64, String, TrustLevel, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Registrar for RecordingRegistrar {
        async fn confirm_registration(
            &self,
            faction: FactionId,
            user_id: u64,
            nick: &str,
            level: TrustLevel,
            code: &str,
        ) -> bool {
            self.calls.lock().unwrap().push((
                faction,
                user_id,
                nick.to_string(),
                level,
                code.to_string(),
            ));
            self.accept.iter().any(|c| c == code)
        }
    }
}
