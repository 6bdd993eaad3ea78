//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod error;
pub mod market;
pub mod technical;
pub mod rule;
pub mod rule_builtin;
pub mod engine;
pub mod scoring;
pub mod strategy;
pub mod config_validation;
pub mod pick;
pub mod explain;
pub mod recommend;
pub mod screener;
pub mod watchlist;
pub mod llm;
pub mod deep_analysis;
pub mod task;
pub mod scheduler;
