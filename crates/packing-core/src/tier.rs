use serde::{Deserialize, Serialize};

use crate::config::PackagingRules;
use crate::types::PackagingTier;

/// Packaging decision for a single unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDecision {
    pub tier: PackagingTier,
    pub fragile: bool,
    /// Short enough to share a box with siblings
    pub combinable: bool,
}

impl TierDecision {
    const fn new(tier: PackagingTier, fragile: bool, combinable: bool) -> Self {
        Self {
            tier,
            fragile,
            combinable,
        }
    }
}

/// Maps a unit's thickness code, length and width to its packaging tier.
pub fn resolve_tier(
    thickness: u32,
    length_m: f64,
    width_cm: u32,
    rules: &PackagingRules,
) -> TierDecision {
    if width_cm >= rules.wrap_override_width_cm && length_m >= rules.wrap_override_length_m {
        return TierDecision::new(PackagingTier::Wrap, true, false);
    }

    let thresholds = rules.thresholds_for(thickness);
    if length_m >= thresholds.wrap {
        TierDecision::new(PackagingTier::Wrap, true, false)
    } else if length_m >= thresholds.large {
        TierDecision::new(PackagingTier::LargeBox, false, false)
    } else if length_m >= thresholds.small {
        TierDecision::new(PackagingTier::SmallBox, false, false)
    } else {
        TierDecision::new(PackagingTier::SmallBox, false, true)
    }
}

/// Tier of a box holding several combined units, judged on their total length.
///
/// The combined length is held to the large-box capacity while binning, so
/// anything longer than the small threshold needs a large box.
pub fn resolve_combined_tier(
    max_thickness: u32,
    total_length_m: f64,
    rules: &PackagingRules,
) -> (PackagingTier, bool) {
    let thresholds = rules.thresholds_for(max_thickness);
    if total_length_m >= thresholds.wrap {
        (PackagingTier::Wrap, true)
    } else if total_length_m > thresholds.small {
        (PackagingTier::LargeBox, false)
    } else {
        (PackagingTier::SmallBox, false)
    }
}
