//! Shipping-fee lookup against the rate table.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FeeRules;
use crate::packer::PackUnit;
use crate::types::{LineClass, PackingError, ProductGroup, Result, ShippingFeeRule};

/// Float slack for tolerance comparisons (1.7 vs 1.6 must sit inside 0.1)
const EPSILON: f64 = 1e-9;

/// Aggregate physical profile of a box, as the rate table sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeProfile {
    pub product_group: ProductGroup,
    /// Required packaging descriptor; `None` leaves packaging unconstrained
    pub packaging_type: Option<String>,
    /// Metres for rolls, piece count for puzzle mats
    pub length: f64,
    pub width_cm: Option<f64>,
    pub thickness_cm: Option<f64>,
}

impl FeeProfile {
    /// Profile of a box from its units. The first unit decides the product
    /// group; tape riding along in the box is ignored.
    pub fn from_units(units: &[PackUnit], rules: &FeeRules) -> Option<FeeProfile> {
        let first = units.first()?;
        let product_group = first.line.category.fee_group()?;
        let billed: Vec<&PackUnit> = units.iter().filter(|u| u.class != LineClass::Tape).collect();

        let length = if product_group == ProductGroup::PuzzleMat {
            billed.iter().map(|u| f64::from(u.quantity)).sum()
        } else {
            billed
                .iter()
                .map(|u| u.length_m * f64::from(u.quantity))
                .sum()
        };
        let width_cm = billed
            .iter()
            .map(|u| u.line.width_cm)
            .filter(|w| *w > 0)
            .max()
            .map(f64::from);
        let thickness_cm = billed
            .iter()
            .map(|u| u.line.thickness)
            .filter(|t| *t > 0)
            .max()
            .map(|t| f64::from(t) / 10.0);

        Some(FeeProfile {
            product_group,
            packaging_type: (product_group == ProductGroup::PuzzleMat)
                .then(|| rules.puzzle_packaging_type.clone()),
            length,
            width_cm,
            thickness_cm,
        })
    }

    /// Profile of a hypothetical puzzle box holding `count` pieces.
    pub fn puzzle(count: u32, width_cm: u32, thickness: u32, rules: &FeeRules) -> FeeProfile {
        FeeProfile {
            product_group: ProductGroup::PuzzleMat,
            packaging_type: Some(rules.puzzle_packaging_type.clone()),
            length: f64::from(count),
            width_cm: (width_cm > 0).then(|| f64::from(width_cm)),
            thickness_cm: (thickness > 0).then(|| f64::from(thickness) / 10.0),
        }
    }
}

/// Outcome of a fee lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum FeeQuote {
    Matched { seq: u32, fee: u64 },
    /// Too long for the matching large box; ships wrapped at a surcharge
    OversizeWrap { seq: u32, base_fee: u64, surcharge: u64 },
    /// No rule applies; needs manual pricing
    Unresolved,
}

impl FeeQuote {
    pub fn amount(&self) -> u64 {
        match self {
            FeeQuote::Matched { fee, .. } => *fee,
            FeeQuote::OversizeWrap {
                base_fee,
                surcharge,
                ..
            } => base_fee + surcharge,
            FeeQuote::Unresolved => 0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, FeeQuote::Unresolved)
    }
}

fn within(value: Option<f64>, bound: Option<f64>, tolerance: f64) -> bool {
    match (value, bound) {
        (Some(v), Some(b)) => (v - b).abs() <= tolerance + EPSILON,
        _ => true,
    }
}

fn packaging_matches(wanted: Option<&str>, rule: &str, rules: &FeeRules) -> bool {
    let Some(wanted) = wanted else {
        return true;
    };
    let compact = |s: &str| s.split_whitespace().collect::<String>();
    let (wanted, rule) = (compact(wanted), compact(rule));
    let descriptor = compact(&rules.wrap_descriptor);
    wanted == rule
        || (!descriptor.is_empty() && wanted.starts_with(&descriptor) && rule.starts_with(&descriptor))
}

fn length_matches(length: f64, rule: &ShippingFeeRule) -> bool {
    if rule.length_min.is_none() && rule.length_max.is_none() {
        return true;
    }
    length > 0.0
        && length + EPSILON >= rule.length_min.unwrap_or(0.0)
        && length <= rule.length_max.unwrap_or(f64::INFINITY) + EPSILON
}

/// Scans the rate table in order; the first fully matching rule wins.
///
/// When nothing matches but a large-box rule fit everything except an
/// exceeded maximum length, the box is billed at that rule's fee plus the
/// oversize surcharge. The last such rule seen is used.
pub fn resolve_fee(profile: &FeeProfile, table: &[ShippingFeeRule], rules: &FeeRules) -> FeeQuote {
    let mut oversize: Option<&ShippingFeeRule> = None;

    for rule in table.iter().filter(|r| r.product_group == profile.product_group) {
        let width_ok = within(profile.width_cm, rule.width, rules.width_tolerance_cm);
        let thickness_ok = within(profile.thickness_cm, rule.thickness, rules.thickness_tolerance_cm);
        let length_ok = length_matches(profile.length, rule);

        if !length_ok
            && width_ok
            && thickness_ok
            && rule.packaging_type.contains(rules.large_box_marker.as_str())
            && rule
                .length_max
                .is_some_and(|max| profile.length > max + EPSILON)
        {
            oversize = Some(rule);
        }

        if width_ok
            && thickness_ok
            && length_ok
            && packaging_matches(profile.packaging_type.as_deref(), &rule.packaging_type, rules)
        {
            return FeeQuote::Matched {
                seq: rule.seq,
                fee: rule.fee,
            };
        }
    }

    match oversize {
        Some(rule) => {
            debug!(seq = rule.seq, length = profile.length, "Billing oversize box as wrap");
            FeeQuote::OversizeWrap {
                seq: rule.seq,
                base_fee: rule.fee,
                surcharge: rules.oversize_surcharge,
            }
        }
        None => FeeQuote::Unresolved,
    }
}

/// Rejects rate-table rows that can never match.
pub fn validate_fee_table(table: &[ShippingFeeRule]) -> Result<()> {
    for rule in table {
        if let (Some(min), Some(max)) = (rule.length_min, rule.length_max) {
            if min > max {
                return Err(PackingError::InvalidReference(format!(
                    "Fee rule {} has length_min {} above length_max {}",
                    rule.seq, min, max
                )));
            }
        }
        let negative = [rule.width, rule.thickness, rule.length_min, rule.length_max]
            .into_iter()
            .flatten()
            .any(|v| v < 0.0);
        if negative {
            return Err(PackingError::InvalidReference(format!(
                "Fee rule {} has a negative dimension",
                rule.seq
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(
        seq: u32,
        group: ProductGroup,
        packaging: &str,
        fee: u64,
        dims: (Option<f64>, Option<f64>),
        length: (Option<f64>, Option<f64>),
    ) -> ShippingFeeRule {
        ShippingFeeRule {
            seq,
            product_group: group,
            packaging_type: packaging.into(),
            fee,
            width: dims.0,
            thickness: dims.1,
            length_min: length.0,
            length_max: length.1,
        }
    }

    fn roll_table() -> Vec<ShippingFeeRule> {
        vec![
            rule(
                1,
                ProductGroup::PvcRollMat,
                "소박스",
                5000,
                (Some(110.0), Some(1.2)),
                (Some(0.1), Some(3.5)),
            ),
            rule(
                2,
                ProductGroup::PvcRollMat,
                "대박스",
                9000,
                (Some(110.0), Some(1.2)),
                (Some(3.6), Some(8.0)),
            ),
            rule(
                3,
                ProductGroup::PuzzleMat,
                "강화비닐(100x100cm)",
                7000,
                (Some(100.0), Some(2.5)),
                (Some(1.0), Some(6.0)),
            ),
        ]
    }

    fn roll_profile(length: f64, width: f64, thickness: f64) -> FeeProfile {
        FeeProfile {
            product_group: ProductGroup::PvcRollMat,
            packaging_type: None,
            length,
            width_cm: Some(width),
            thickness_cm: Some(thickness),
        }
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = FeeRules::default();
        let quote = resolve_fee(&roll_profile(3.0, 110.0, 1.2), &roll_table(), &rules);
        assert_eq!(quote, FeeQuote::Matched { seq: 1, fee: 5000 });
        let quote = resolve_fee(&roll_profile(6.0, 110.0, 1.2), &roll_table(), &rules);
        assert_eq!(quote.amount(), 9000);
    }

    #[test]
    fn test_tolerance_bands() {
        let rules = FeeRules::default();
        let table = roll_table();
        assert_eq!(resolve_fee(&roll_profile(3.0, 115.0, 1.3), &table, &rules).amount(), 5000);
        assert_eq!(resolve_fee(&roll_profile(3.0, 105.0, 1.1), &table, &rules).amount(), 5000);
        assert_eq!(
            resolve_fee(&roll_profile(3.0, 116.0, 1.2), &table, &rules),
            FeeQuote::Unresolved
        );
        assert_eq!(
            resolve_fee(&roll_profile(3.0, 110.0, 1.4), &table, &rules),
            FeeQuote::Unresolved
        );
    }

    #[test]
    fn test_oversize_large_box_gets_surcharge() {
        let rules = FeeRules::default();
        let quote = resolve_fee(&roll_profile(8.5, 110.0, 1.2), &roll_table(), &rules);
        assert_eq!(
            quote,
            FeeQuote::OversizeWrap {
                seq: 2,
                base_fee: 9000,
                surcharge: 5000
            }
        );
        assert_eq!(quote.amount(), 14_000);
    }

    #[test]
    fn test_unknown_group_is_unresolved() {
        let rules = FeeRules::default();
        let mut profile = roll_profile(3.0, 110.0, 1.2);
        profile.product_group = ProductGroup::TpuMat;
        let quote = resolve_fee(&profile, &roll_table(), &rules);
        assert_eq!(quote, FeeQuote::Unresolved);
        assert_eq!(quote.amount(), 0);
        assert!(!quote.is_resolved());
    }

    #[test]
    fn test_puzzle_packaging_prefix_match() {
        let rules = FeeRules::default();
        let mut table = roll_table();
        table[2].packaging_type = "강화비닐 (100x100cm) 2겹".into();
        let quote = resolve_fee(&FeeProfile::puzzle(6, 100, 25, &rules), &table, &rules);
        assert_eq!(quote, FeeQuote::Matched { seq: 3, fee: 7000 });
        let quote = resolve_fee(&FeeProfile::puzzle(7, 100, 25, &rules), &table, &rules);
        assert_eq!(quote, FeeQuote::Unresolved);
    }

    #[test]
    fn test_absent_dimensions_skip_constraint() {
        let rules = FeeRules::default();
        let profile = FeeProfile {
            width_cm: None,
            thickness_cm: None,
            ..roll_profile(2.0, 0.0, 0.0)
        };
        assert_eq!(resolve_fee(&profile, &roll_table(), &rules).amount(), 5000);
    }

    #[test]
    fn test_unbounded_rule_matches_zero_length() {
        let rules = FeeRules::default();
        let table = vec![rule(9, ProductGroup::TpuMat, "박스", 4000, (None, None), (None, None))];
        let profile = FeeProfile {
            product_group: ProductGroup::TpuMat,
            packaging_type: None,
            length: 0.0,
            width_cm: None,
            thickness_cm: None,
        };
        assert_eq!(resolve_fee(&profile, &table, &rules).amount(), 4000);
        assert_eq!(resolve_fee(&roll_profile(0.0, 110.0, 1.2), &roll_table(), &rules), FeeQuote::Unresolved);
    }

    #[test]
    fn test_fee_table_validation() {
        let mut table = roll_table();
        assert!(validate_fee_table(&table).is_ok());
        table[0].length_min = Some(9.0);
        assert!(matches!(
            validate_fee_table(&table),
            Err(PackingError::InvalidReference(_))
        ));
    }
}
