//! IRC side of the relay: the connection, its outbound queue and the
//! channel commands.

mod client;
mod commands;
mod message;

pub use client::{IrcClient, outbound_queue};
pub use commands::CommandHandler;
