pub mod enhanced;
pub mod filter;
pub mod history;
pub mod predictor;
pub mod recommendation;
pub mod scoring;
pub mod zones;

pub use enhanced::{score_enhanced, EnhancedSignals};
pub use filter::{filter_candidates, validate_requirements, FilterOutcome, Rejection};
pub use scoring::{rank, score, ScoringPool, MIN_VIABLE_SCORE};
pub use zones::{rank_zones, ZoneInputs, ZoneSignal};
