//! Core data models for the match engine.

mod decision;
mod ids;
mod match_record;
mod player;
mod round;
mod stats;

pub use decision::*;
pub use ids::*;
pub use match_record::*;
pub use player::*;
pub use round::*;
pub use stats::*;
