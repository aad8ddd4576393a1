//! CLI command modules.

pub mod check;
pub mod config;
pub mod create;
pub mod dispatch;
pub mod editor;
pub mod remove;
pub mod send;
pub mod watch;
