//! Cards Module
//!
//! Per-hitter aggregation and the development/exploit recommendation tracks.

pub mod aggregate;
pub mod recommend;

pub use aggregate::{
    aggregate_cards, BattedBall, HitterBreakdown, HitterCard, HitterTotals, PowerEvents,
    Recommendations, UNKNOWN_HITTER,
};
pub use recommend::{
    apply_deterministic, cap_fill_unique, deterministic_confidence, deterministic_development,
    deterministic_exploit, sample_aware_confidence, sample_size_scale, RecommendationReply,
    Recommender, RecommenderOptions,
};
