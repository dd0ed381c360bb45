pub mod client;
pub mod config;
pub mod context;
pub mod events;
pub mod humanize;
pub mod observability;
pub mod poller;
pub mod registry;
pub mod session;
pub mod tasks;
pub mod token;
pub mod transfer;
