//! Habit Coach — challenge lifecycle engine with a points ledger.

pub mod bot;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;
