//! SeersLeague backend library
//!
//! Read models over the SeersLeague prediction ledger on Base, the HTTP
//! surface that serves them, and the miniapp notification webhook.

pub mod api;
pub mod config;
pub mod guard;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod stats;
