//! Channel commands.
//!
//! - `!chat` reports whether the channel relays its faction's chat
//! - `!chat on` / `!chat off` toggle that (registered officers only)
//! - `!register` issues a code to post in faction chat

use super::client::IrcSink;
use crate::config::Config;
use crate::confirm::TrustLevel;
use crate::db::Database;
use crate::feed::{ChatFeed, FactionId};
use crate::poller::Poller;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    ChatStatus,
    ChatOn,
    ChatOff,
    ChatUsage,
    Register,
}

impl ChannelCommand {
    /// Parse the text after the command prefix.
    pub fn parse(body: &str) -> Option<Self> {
        let mut words = body.split_whitespace();
        let name = words.next()?.to_ascii_lowercase();
        let arg = words.next().map(str::to_ascii_lowercase);

        match name.as_str() {
            "chat" => Some(match arg.as_deref() {
                None => ChannelCommand::ChatStatus,
                Some("on") => ChannelCommand::ChatOn,
                Some("off") => ChannelCommand::ChatOff,
                Some(_) => ChannelCommand::ChatUsage,
            }),
            "register" => Some(ChannelCommand::Register),
            _ => None,
        }
    }
}

pub struct CommandHandler {
    config: Arc<Config>,
    poller: Arc<Poller>,
    db: Database,
    sink: IrcSink,
}

impl CommandHandler {
    pub fn new(config: Arc<Config>, poller: Arc<Poller>, db: Database, sink: IrcSink) -> Self {
        Self {
            config,
            poller,
            db,
            sink,
        }
    }

    fn strip_prefix<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.trim_start()
            .strip_prefix(self.config.irc.command_prefix.as_str())
    }

    /// Cheap check used by the connection before spawning a handler.
    pub fn is_command(&self, text: &str) -> bool {
        self.strip_prefix(text)
            .and_then(ChannelCommand::parse)
            .is_some()
    }

    pub async fn handle(&self, channel: &str, nick: &str, text: &str) {
        let Some(command) = self.strip_prefix(text).and_then(ChannelCommand::parse) else {
            return;
        };

        match command {
            ChannelCommand::Register => self.register(nick).await,
            ChannelCommand::ChatUsage => {
                let usage = format!("{}chat <on|off>", self.config.irc.command_prefix);
                self.sink
                    .privmsg(channel, &format!("{}: Usage: {}", nick, usage));
            }
            ChannelCommand::ChatStatus | ChannelCommand::ChatOn | ChannelCommand::ChatOff => {
                let Some(faction) = self.config.faction_for_channel(channel) else {
                    self.sink.privmsg(
                        channel,
                        &format!("{}: This channel is not linked to a faction.", nick),
                    );
                    return;
                };
                let (id, name) = (FactionId(faction.id), faction.name.clone());
                match command {
                    ChannelCommand::ChatStatus => self.status(channel, id, &name).await,
                    ChannelCommand::ChatOn => {
                        if self.authorize(channel, nick, id, &name).await {
                            self.chat_on(channel, id, &name).await;
                        }
                    }
                    _ => {
                        if self.authorize(channel, nick, id, &name).await {
                            self.chat_off(channel, id, &name).await;
                        }
                    }
                }
            }
        }
    }

    /// Registered at officer level or above in this faction.
    async fn authorize(&self, channel: &str, nick: &str, faction: FactionId, name: &str) -> bool {
        let allowed = match self.db.registrations().find(nick).await {
            Ok(Some(reg)) => reg.faction == faction && reg.level >= TrustLevel::Officer,
            Ok(None) => false,
            Err(e) => {
                warn!(nick = %nick, error = %e, "Registration lookup failed");
                false
            }
        };
        if !allowed {
            self.sink.privmsg(
                channel,
                &format!(
                    "{}: You must be registered as an officer of {} to do that.",
                    nick, name
                ),
            );
        }
        allowed
    }

    async fn chat_on(&self, channel: &str, faction: FactionId, name: &str) {
        let subscribed = if self.poller.is_monitored(faction) {
            self.poller.add_channel(faction, channel).await
        } else {
            let adapter = Arc::new(ChatFeed::new(self.config.relay.tag.clone()));
            self.poller
                .add_feed(faction, adapter, &[channel.to_string()])
                .await
        };

        let reply = if subscribed {
            info!(faction = %faction, channel = %channel, "Chat relay enabled");
            format!("Faction chat for {} will now be relayed here.", name)
        } else {
            format!("Faction chat for {} is already relayed here.", name)
        };
        self.sink.privmsg(channel, &reply);
    }

    async fn chat_off(&self, channel: &str, faction: FactionId, name: &str) {
        let reply = match self.poller.remove_channel(faction, channel).await {
            Some(now_empty) => {
                if now_empty {
                    self.poller.remove_feed(faction);
                }
                info!(faction = %faction, channel = %channel, "Chat relay disabled");
                format!("Faction chat for {} will no longer be relayed here.", name)
            }
            None => format!("Faction chat for {} is not being relayed.", name),
        };
        self.sink.privmsg(channel, &reply);
    }

    async fn status(&self, channel: &str, faction: FactionId, name: &str) {
        let relayed_here = self
            .poller
            .channels(faction)
            .await
            .is_some_and(|channels| channels.iter().any(|c| c.eq_ignore_ascii_case(channel)));

        let reply = if relayed_here {
            match self.poller.last_seen().last_seen(faction) {
                Some(post) => format!("Faction chat for {} is on (last post {}).", name, post),
                None => format!("Faction chat for {} is on (no posts yet).", name),
            }
        } else {
            format!("Faction chat for {} is off.", name)
        };
        self.sink.privmsg(channel, &reply);
    }

    async fn register(&self, nick: &str) {
        match self.db.registrations().begin(nick).await {
            Ok(code) => {
                self.sink.notice(
                    nick,
                    &format!(
                        "To finish registering, post this in your faction chat: {} confirm {} {}",
                        self.config.irc.nick, nick, code
                    ),
                );
            }
            Err(e) => {
                warn!(nick = %nick, error = %e, "Could not start registration");
                self.sink
                    .notice(nick, "Registration is unavailable right now, try again later.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NotificationDispatcher;
    use crate::dispatch::testing::{NumberedNames, RecordingSink};
    use crate::error::FetchResult;
    use crate::feed::{FeedRequest, Transport};
    use crate::irc::client::outbound_queue;
    use crate::irc::message::Outbound;
    use crate::state::LastSeen;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct OnePost;

    #[async_trait]
    impl Transport for OnePost {
        async fn fetch(
            &self,
            _faction: FactionId,
            _request: &FeedRequest,
        ) -> FetchResult<serde_json::Value> {
            Ok(json!({"messages": [{"post_id": 77, "user_id": 1, "message": "hi"}]}))
        }
    }

    const CONFIG: &str = r##"
        [irc]
        server = "irc.example.net:6667"
        nick = "relay"

        [remote]
        base_url = "https://game.example.com"

        [[factions]]
        id = 1000
        name = "Wolves"
        user_id = 1
        auth_token = "secret"
        channels = ["#wolves"]
        chat = false
    "##;

    async fn setup() -> (CommandHandler, Database, Arc<Poller>, mpsc::Receiver<Outbound>) {
        let config: Config = toml::from_str(CONFIG).unwrap();
        let dispatcher = NotificationDispatcher::new(
            Arc::new(NumberedNames),
            Arc::new(RecordingSink::default()),
            LastSeen::new(),
        );
        let poller = Arc::new(Poller::new(
            Arc::new(OnePost),
            dispatcher,
            Duration::from_secs(60),
            Duration::from_secs(5),
        ));
        let db = Database::new(":memory:").await.unwrap();
        let (sink, rx) = outbound_queue();
        let handler = CommandHandler::new(Arc::new(config), poller.clone(), db.clone(), sink);
        (handler, db, poller, rx)
    }

    async fn register(db: &Database, nick: &str, faction: u64, level: TrustLevel) {
        let code = db.registrations().begin(nick).await.unwrap();
        assert!(
            db.registrations()
                .confirm(FactionId(faction), 5, nick, level, &code)
                .await
                .unwrap()
        );
    }

    fn reply(rx: &mut mpsc::Receiver<Outbound>) -> String {
        match rx.try_recv().unwrap() {
            Outbound::Privmsg { text, .. } | Outbound::Notice { text, .. } => text,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(ChannelCommand::parse("chat"), Some(ChannelCommand::ChatStatus));
        assert_eq!(ChannelCommand::parse("CHAT On"), Some(ChannelCommand::ChatOn));
        assert_eq!(ChannelCommand::parse("chat off"), Some(ChannelCommand::ChatOff));
        assert_eq!(ChannelCommand::parse("chat maybe"), Some(ChannelCommand::ChatUsage));
        assert_eq!(ChannelCommand::parse("register"), Some(ChannelCommand::Register));
        assert_eq!(ChannelCommand::parse("help"), None);
        assert_eq!(ChannelCommand::parse(""), None);
    }

    #[tokio::test]
    async fn test_is_command_needs_prefix() {
        let (handler, ..) = setup().await;
        assert!(handler.is_command("!chat on"));
        assert!(!handler.is_command("chat on"));
        assert!(!handler.is_command("!dance"));
    }

    #[tokio::test]
    async fn test_officer_turns_chat_on_and_off() {
        let (handler, db, poller, mut rx) = setup().await;
        register(&db, "alice", 1000, TrustLevel::Officer).await;

        handler.handle("#Wolves", "alice", "!chat on").await;
        assert!(reply(&mut rx).contains("will now be relayed"));
        assert!(poller.is_monitored(FactionId(1000)));
        assert_eq!(poller.last_seen().last_seen(FactionId(1000)), Some(77));

        handler.handle("#wolves", "alice", "!chat").await;
        assert!(reply(&mut rx).contains("is on (last post 77)"));

        handler.handle("#wolves", "ALICE", "!chat off").await;
        assert!(reply(&mut rx).contains("no longer"));
        assert!(!poller.is_monitored(FactionId(1000)));

        handler.handle("#wolves", "alice", "!chat").await;
        assert!(reply(&mut rx).contains("is off"));
    }

    #[tokio::test]
    async fn test_members_and_outsiders_are_refused() {
        let (handler, db, poller, mut rx) = setup().await;
        register(&db, "bob", 1000, TrustLevel::Member).await;
        register(&db, "carol", 2000, TrustLevel::Leader).await;

        for nick in ["bob", "carol", "dave"] {
            handler.handle("#wolves", nick, "!chat on").await;
            assert!(reply(&mut rx).contains("must be registered as an officer of Wolves"));
        }
        assert!(!poller.is_monitored(FactionId(1000)));
    }

    #[tokio::test]
    async fn test_unlinked_channel() {
        let (handler, _, _, mut rx) = setup().await;
        handler.handle("#elsewhere", "alice", "!chat").await;
        assert!(reply(&mut rx).contains("not linked"));
    }

    #[tokio::test]
    async fn test_register_sends_code_privately() {
        let (handler, db, _, mut rx) = setup().await;
        handler.handle("#wolves", "erin", "!register").await;

        let Outbound::Notice { target, text } = rx.try_recv().unwrap() else {
            panic!("expected a notice");
        };
        assert_eq!(target, "erin");
        let code = text.rsplit(' ').next().unwrap();
        assert!(text.contains("relay confirm erin "));
        assert!(
            db.registrations()
                .confirm(FactionId(1000), 5, "erin", TrustLevel::Member, code)
                .await
                .unwrap()
        );
    }
}
