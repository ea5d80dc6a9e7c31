//! # Dilemma Engine
//!
//! Server-authoritative match engine for a two-player iterated prisoner's
//! dilemma.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (ids, decisions, rounds, match records, stats)
//! - **engine**: Per-match state machine, round clock, workers and the registry
//! - **calculate**: Per-match statistics and behavioral tags
//! - **trust**: Trust score model, matchmaking ranges and leaderboard composite
//! - **matchmaking**: Trust-bounded pairing queue
//! - **transport**: Outbound delivery seam
//! - **storage**: JSONL persistence of match records and player stats
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod engine;
pub mod matchmaking;
pub mod models;
pub mod storage;
pub mod transport;
pub mod trust;

pub use models::*;
