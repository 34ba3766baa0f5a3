//! CLI commands

pub mod config;
pub mod messages;
pub mod shutdown;
pub mod tasks;
pub mod team;
pub mod worker;
