//! Personal alarm agent for a streaming notification feed.
//!
//! The agent follows a long-poll feed, turns top-priority messages into a
//! persistent audible alarm, and silences it when a sentinel file appears in
//! its state directory. See [`agent`] for the control loop.

pub mod agent;
pub mod alert;
pub mod config;
pub mod control;
pub mod db;
pub mod effects;
pub mod feed;
pub mod health;
pub mod limiter;
pub mod models;
