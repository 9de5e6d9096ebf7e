//! Terminal chat panel for a local WebSocket assistant.
//!
//! A [`panel::Panel`] owns one connection to the server, renders everything it
//! receives as Markdown, forwards typed lines verbatim, and keeps the
//! connection alive with a linear, capped backoff. The embedding process is
//! told about the panel's lifecycle through [`host_bridge`] notifications.

pub mod config;
pub mod connection;
pub mod host_bridge;
pub mod input;
pub mod panel;
pub mod plain;
pub mod transcript;
pub mod tui;

#[cfg(test)]
pub(crate) mod test_helpers;
