//! factionrelay - relays game faction chat into IRC channels.
//!
//! Polls each configured faction's chat feed, posts new messages to the
//! faction's channels and turns `<bot> confirm <nick> <code>` posts into IRC
//! nick registrations.

mod config;
mod confirm;
mod db;
mod dispatch;
mod error;
mod feed;
mod http;
mod irc;
mod metrics;
mod poller;
mod remote;
mod state;

use crate::config::Config;
use crate::confirm::ConfirmHandler;
use crate::db::Database;
use crate::dispatch::NotificationDispatcher;
use crate::feed::{ChatFeed, FactionId};
use crate::irc::{CommandHandler, IrcClient, outbound_queue};
use crate::poller::{Poller, spawn_poll_task};
use crate::remote::{ApiClient, MemberCache, NameCache};
use crate::state::LastSeen;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {}",
            errors.len(),
            config_path
        ));
    }
    let config = Arc::new(config);

    info!(
        server = %config.irc.server,
        nick = %config.irc.nick,
        factions = config.factions.len(),
        "Starting factionrelay"
    );

    // Convention: metrics port 0 disables the HTTP endpoint.
    let metrics_port = config.metrics.port;
    if metrics_port != 0 {
        metrics::init();
    }

    let db = Database::new(&config.database.path).await?;

    let api = Arc::new(ApiClient::new(&config.remote, &config.factions));
    let names = Arc::new(NameCache::new(api.clone()));
    let members = Arc::new(MemberCache::new(
        api.clone(),
        names.clone(),
        config.remote.member_cache_ttl(),
    ));

    let (sink, outbound) = outbound_queue();
    let sink_handle = Arc::new(sink.clone());

    let confirm = Arc::new(ConfirmHandler::new(
        &config.irc.nick,
        members,
        Arc::new(db.clone()),
        sink_handle.clone(),
    )?);

    let dispatcher = NotificationDispatcher::new(names, sink_handle, LastSeen::new())
        .with_max_items_per_line(config.relay.max_items_per_display_line)
        .with_hook(confirm);

    let poller = Arc::new(Poller::new(
        api,
        dispatcher,
        config.poll.interval(),
        config.remote.timeout(),
    ));

    for faction in config.factions.iter().filter(|f| f.chat) {
        let adapter = Arc::new(ChatFeed::new(config.relay.tag.clone()));
        poller
            .add_feed(FactionId(faction.id), adapter, &faction.channels)
            .await;
    }

    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        let last_seen = poller.last_seen();
        tokio::spawn(async move {
            http::run_http_server(metrics_port, last_seen).await;
        });
        info!(port = metrics_port, "Metrics HTTP server started");
    }

    spawn_poll_task(Arc::clone(&poller));

    let channels: Vec<String> = config
        .factions
        .iter()
        .flat_map(|f| f.channels.iter().cloned())
        .collect();
    let commands = Arc::new(CommandHandler::new(
        Arc::clone(&config),
        poller,
        db,
        sink,
    ));

    let client = IrcClient::new(config.irc.clone(), channels, outbound, commands);
    tokio::select! {
        _ = client.run() => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    Ok(())
}
