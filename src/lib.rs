//! Supervise AI coding agents running in tmux sessions.
//!
//! The interesting part is inferring agent state from terminal output alone:
//! [`output`] cleans pane captures and finds approval dialogs, [`monitor`]
//! classifies health and turns state changes into notifications, and
//! [`transcript`] extracts structured events from full session captures.

pub mod config;
pub mod error;
pub mod monitor;
pub mod output;
pub mod tasks;
pub mod tmux;
pub mod transcript;

pub use error::{MonitorError, Result};
