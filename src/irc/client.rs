//! IRC connection.
//!
//! One task owns the socket. Everything else talks to it through an
//! [`IrcSink`], which queues [`Outbound`] messages on a bounded channel. The
//! queue survives reconnects, so lines produced while the link is down go
//! out once the bot is registered again, up to the queue capacity.

use super::commands::CommandHandler;
use super::message::{IrcLine, MAX_LINE_BYTES, Outbound, is_channel, split_text};
use crate::config::IrcConfig;
use crate::dispatch::ChannelSink;
use crate::error::IrcError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

/// Outbound queue depth.
const QUEUE_CAPACITY: usize = 1024;

type Connection = Framed<TcpStream, LinesCodec>;

/// Create the outbound queue.
pub fn outbound_queue() -> (IrcSink, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (IrcSink { tx }, rx)
}

/// Cloneable handle for sending to IRC.
#[derive(Clone)]
pub struct IrcSink {
    tx: mpsc::Sender<Outbound>,
}

impl IrcSink {
    /// Queue a message. Never waits: a full queue drops the message.
    pub fn queue(&self, msg: Outbound) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(line = %msg.to_line(), "IRC send queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("IRC connection task gone, dropping message");
            }
        }
    }

    /// Queue a PRIVMSG, one per chunk when `text` is too long for a line.
    pub fn privmsg(&self, target: &str, text: &str) {
        for text in split_text(text) {
            self.queue(Outbound::Privmsg {
                target: target.to_string(),
                text,
            });
        }
    }

    pub fn notice(&self, target: &str, text: &str) {
        for text in split_text(text) {
            self.queue(Outbound::Notice {
                target: target.to_string(),
                text,
            });
        }
    }
}

#[async_trait]
impl ChannelSink for IrcSink {
    async fn send(&self, channel: &str, text: &str) {
        self.privmsg(channel, text);
    }
}

pub struct IrcClient {
    config: IrcConfig,
    channels: Vec<String>,
    outbound: mpsc::Receiver<Outbound>,
    commands: Arc<CommandHandler>,
}

impl IrcClient {
    pub fn new(
        config: IrcConfig,
        channels: Vec<String>,
        outbound: mpsc::Receiver<Outbound>,
        commands: Arc<CommandHandler>,
    ) -> Self {
        Self {
            config,
            channels,
            outbound,
            commands,
        }
    }

    /// Stay connected forever, reconnecting after a fixed delay.
    pub async fn run(mut self) {
        let delay = Duration::from_secs(self.config.reconnect_delay_secs);
        loop {
            match self.session().await {
                Ok(()) => {
                    info!("Outbound queue closed, IRC client stopping");
                    return;
                }
                Err(e) => {
                    warn!(
                        server = %self.config.server,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "IRC connection lost, reconnecting"
                    );
                }
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection, from TCP connect until it drops.
    async fn session(&mut self) -> Result<(), IrcError> {
        let stream = TcpStream::connect(&self.config.server).await?;
        let mut conn = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        info!(server = %self.config.server, nick = %self.config.nick, "Connected to IRC");

        if let Some(password) = &self.config.password {
            write_line(&mut conn, &format!("PASS {}", password)).await?;
        }
        let mut nick = self.config.nick.clone();
        write_line(&mut conn, &format!("NICK {}", nick)).await?;
        write_line(
            &mut conn,
            &format!("USER {} 0 * :{}", self.config.user, self.config.realname),
        )
        .await?;

        let mut registered = false;
        loop {
            tokio::select! {
                line = conn.next() => {
                    let line = match line {
                        Some(line) => line?,
                        None => return Err(IrcError::Closed),
                    };
                    let Some(msg) = IrcLine::parse(&line) else {
                        continue;
                    };
                    match msg.command.as_str() {
                        "PING" => {
                            let token = msg.param(0).unwrap_or_default();
                            write_line(&mut conn, &format!("PONG :{}", token)).await?;
                        }
                        "001" => {
                            registered = true;
                            info!(nick = %nick, "Registered with IRC server");
                            for channel in &self.channels {
                                write_line(&mut conn, &Outbound::Join(channel.clone()).to_line())
                                    .await?;
                            }
                        }
                        // Nick in use before registration: try with a suffix.
                        "433" if !registered => {
                            nick.push('_');
                            write_line(&mut conn, &format!("NICK {}", nick)).await?;
                        }
                        "ERROR" => {
                            warn!(reason = msg.param(0).unwrap_or_default(), "Server sent ERROR");
                            return Err(IrcError::Closed);
                        }
                        "PRIVMSG" => self.on_privmsg(&msg),
                        _ => {}
                    }
                }
                out = self.outbound.recv(), if registered => {
                    match out {
                        Some(out) => write_line(&mut conn, &out.to_line()).await?,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn on_privmsg(&self, msg: &IrcLine) {
        let (Some(nick), Some(target), Some(text)) =
            (msg.source_nick(), msg.param(0), msg.param(1))
        else {
            return;
        };
        if !is_channel(target) || !self.commands.is_command(text) {
            return;
        }

        // Commands may hit the network; keep reading while they run.
        let commands = Arc::clone(&self.commands);
        let (nick, channel, text) = (nick.to_string(), target.to_string(), text.to_string());
        tokio::spawn(async move {
            commands.handle(&channel, &nick, &text).await;
        });
    }
}

async fn write_line(conn: &mut Connection, line: &str) -> Result<(), IrcError> {
    debug!(line = %line, "IRC >>");
    // LinesCodec appends the '\n'
    conn.send(format!("{}\r", line)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::message::MAX_TEXT_BYTES;
    use super::*;
    use crate::dispatch::testing::NumberedNames;
    use crate::dispatch::{Batch, NotificationDispatcher};
    use crate::feed::{Cursor, FactionId, FeedItem};
    use crate::state::LastSeen;

    #[tokio::test]
    async fn test_sink_queues_privmsg() {
        let (sink, mut rx) = outbound_queue();
        ChannelSink::send(&sink, "#faction", "[FEED] alice: hi").await;
        sink.notice("bob", "psst");

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Privmsg {
                target: "#faction".into(),
                text: "[FEED] alice: hi".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Notice {
                target: "bob".into(),
                text: "psst".into()
            })
        );
    }

    #[tokio::test]
    async fn test_sink_without_client_does_not_block() {
        let (sink, rx) = outbound_queue();
        drop(rx);
        sink.privmsg("#faction", "nobody listening");
    }

    #[test]
    fn test_long_privmsg_is_split_across_lines() {
        let (sink, mut rx) = outbound_queue();
        let words: Vec<String> = (0..150).map(|n| format!("w{}", n)).collect();
        let text = words.join(" ");
        sink.privmsg("#f", &text);

        let mut chunks = Vec::new();
        while let Ok(Outbound::Privmsg { target, text }) = rx.try_recv() {
            assert_eq!(target, "#f");
            assert!(text.len() <= MAX_TEXT_BYTES);
            chunks.push(text);
        }
        assert!(chunks.len() > 1);
        assert_eq!(chunks.join(" "), text);
    }

    #[tokio::test]
    async fn test_batched_posts_all_reach_the_queue() {
        let (sink, mut rx) = outbound_queue();
        let dispatcher = NotificationDispatcher::new(
            Arc::new(NumberedNames),
            Arc::new(sink),
            LastSeen::new(),
        )
        .with_max_items_per_line(Some(3));

        let items: Vec<FeedItem> = (1..=3)
            .map(|n| FeedItem {
                item_id: n,
                source_user_id: n,
                text: format!("post{}{}", n, "z".repeat(180)),
            })
            .collect();
        let chans = vec!["#f".to_string()];
        dispatcher
            .notify(Batch {
                faction: FactionId(1),
                tag: "FEED",
                channels: &chans,
                items: &items,
                cursor: Cursor::at(3),
            })
            .await;

        let mut queued = String::new();
        while let Ok(out) = rx.try_recv() {
            let line = out.to_line();
            assert!(line.len() <= MAX_TEXT_BYTES + "PRIVMSG #f :".len());
            queued.push_str(&line);
        }
        for item in &items {
            assert!(queued.contains(&item.text));
        }
    }

    #[test]
    fn test_full_queue_drops() {
        let (sink, mut rx) = outbound_queue();
        for i in 0..QUEUE_CAPACITY + 10 {
            sink.privmsg("#f", &i.to_string());
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, QUEUE_CAPACITY);
    }
}
