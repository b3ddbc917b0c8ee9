pub mod tier;

pub use tier::{has_access, required_tier, Tier, TierParseError, MODEL_TIERS};
