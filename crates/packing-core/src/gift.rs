//! Gift eligibility.
//!
//! Two independent computations: the recipient-level group gift, decided
//! from spend on a fixed set of roll-mat products, and the per-view
//! promotions computed over finished boxes.

use std::sync::Arc;

use crate::config::{GiftMetric, GroupGiftRule, PromotionRules, PromotionScope, QuantityTier};
use crate::packer::{PackedBox, PackingResult};
use crate::types::{GiftAward, OrderLine};

/// Rule set name recorded on group gifts
pub const GROUP_GIFT_SOURCE: &str = "group";

/// Spend on the rule's qualifying products.
pub fn qualifying_spend(lines: &[Arc<OrderLine>], rule: &GroupGiftRule) -> u64 {
    lines
        .iter()
        .filter(|l| rule.product_ids.contains(&l.product_id))
        .map(|l| l.price)
        .sum()
}

/// Higher award at or above the higher threshold, lower award at or above
/// the lower one, nothing below.
pub fn group_gift(lines: &[Arc<OrderLine>], rule: &GroupGiftRule) -> Option<GiftAward> {
    let spend = qualifying_spend(lines, rule);
    let threshold = if spend >= rule.higher.min_spend {
        &rule.higher
    } else if spend >= rule.lower.min_spend {
        &rule.lower
    } else {
        return None;
    };
    Some(GiftAward {
        source: GROUP_GIFT_SOURCE.to_string(),
        text: threshold.text.clone(),
    })
}

/// Quantity of the highest tier whose lower bound `value` reaches.
pub fn tier_quantity(tiers: &[QuantityTier], value: f64) -> Option<u32> {
    tiers
        .iter()
        .filter(|t| value >= t.min)
        .max_by(|a, b| a.min.total_cmp(&b.min))
        .map(|t| t.quantity)
}

/// Figures a promotion is decided on
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PromotionBasis {
    pub roll_length_m: f64,
    /// Price of each distinct contributing line, counted once
    pub spend: u64,
    pub has_roll_or_puzzle: bool,
}

impl PromotionBasis {
    pub fn from_boxes<'a>(
        boxes: impl IntoIterator<Item = &'a PackedBox>,
        rules: &PromotionRules,
    ) -> Self {
        let mut basis = PromotionBasis::default();
        let mut seen: Vec<&str> = Vec::new();

        for unit in boxes.into_iter().flat_map(|b| &b.units) {
            let product_id = &unit.line.product_id;
            let is_roll = rules.roll_product_ids.contains(product_id);
            if is_roll {
                basis.roll_length_m += unit.total_length();
            }
            if is_roll || rules.puzzle_product_ids.contains(product_id) {
                basis.has_roll_or_puzzle = true;
            }
            if !seen.contains(&unit.line.line_id.as_str()) {
                seen.push(&unit.line.line_id);
                basis.spend += unit.line.price;
            }
        }
        basis
    }
}

/// Awards a promotion grants for the given basis.
pub fn promotion_awards(basis: &PromotionBasis, rules: &PromotionRules) -> Vec<GiftAward> {
    let mut awards = Vec::new();

    if let Some(tape) = &rules.tape {
        if basis.roll_length_m >= tape.min_roll_length_m && basis.spend >= tape.min_spend {
            let value = match tape.metric {
                GiftMetric::RollLength => basis.roll_length_m,
                GiftMetric::Spend => basis.spend as f64,
            };
            if let Some(n) = tier_quantity(&tape.tiers, value) {
                awards.push(GiftAward {
                    source: rules.name.clone(),
                    text: tape.template.replace("{n}", &n.to_string()),
                });
            }
        }
    }

    if let Some(sign) = &rules.sign {
        if basis.has_roll_or_puzzle && basis.spend >= sign.min_spend {
            awards.push(GiftAward {
                source: rules.name.clone(),
                text: sign.text.clone(),
            });
        }
    }

    awards
}

/// Whether a box falls inside a promotion's aggregation scope.
pub fn in_scope(packed: &PackedBox, scope: &PromotionScope) -> bool {
    match scope {
        PromotionScope::AllBoxes => true,
        PromotionScope::Courier { courier } => packed.courier == *courier,
    }
}

/// Promotion awards for one recipient group of a packing result.
pub fn promotion_gifts(result: &PackingResult, group: usize, rules: &PromotionRules) -> Vec<GiftAward> {
    let boxes = result
        .boxes_for(group)
        .filter(|b| in_scope(b, &rules.scope));
    promotion_awards(&PromotionBasis::from_boxes(boxes, rules), rules)
}

/// Joins award texts the way manifests print them.
pub fn gift_text(awards: &[GiftAward]) -> String {
    awards
        .iter()
        .map(|a| a.text.as_str())
        .collect::<Vec<_>>()
        .join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn priced(product_id: &str, price: u64) -> Arc<OrderLine> {
        Arc::new(OrderLine {
            product_id: product_id.into(),
            price,
            quantity: 1,
            ..Default::default()
        })
    }

    #[test]
    fn test_group_gift_thresholds() {
        let rule = GroupGiftRule::default();

        let at_lower = vec![priced("6092903705", 95_000)];
        assert_eq!(group_gift(&at_lower, &rule).unwrap().text, "실리콘테이프 1개");

        let below = vec![priced("6092903705", 94_999)];
        assert!(group_gift(&below, &rule).is_none());

        let higher = vec![priced("6092903705", 300_000), priced("4200445704", 200_000)];
        assert_eq!(group_gift(&higher, &rule).unwrap().text, "실리콘테이프 2개");
    }

    #[test]
    fn test_group_gift_ignores_other_products() {
        let rule = GroupGiftRule::default();
        let lines = vec![priced("6626596277", 600_000), priced("6092903705", 10_000)];
        assert_eq!(qualifying_spend(&lines, &rule), 10_000);
        assert!(group_gift(&lines, &rule).is_none());
    }

    #[test]
    fn test_tier_quantity() {
        let config = EngineConfig::default();
        let tiers = &config.promotions[0].tape.as_ref().unwrap().tiers;
        assert_eq!(tier_quantity(tiers, 9.9), None);
        assert_eq!(tier_quantity(tiers, 10.0), Some(1));
        assert_eq!(tier_quantity(tiers, 30.0), Some(2));
        assert_eq!(tier_quantity(tiers, 72.0), Some(3));
    }

    #[test]
    fn test_combined_promotion_awards() {
        let config = EngineConfig::default();
        let combined = config.promotion("combined").unwrap();

        let basis = PromotionBasis {
            roll_length_m: 32.0,
            spend: 250_000,
            has_roll_or_puzzle: true,
        };
        let texts: Vec<String> = promotion_awards(&basis, combined)
            .into_iter()
            .map(|a| a.text)
            .collect();
        assert_eq!(texts, vec!["★증정★테이프20m x2", "★증정★팻말 x1"]);

        let short = PromotionBasis {
            roll_length_m: 8.0,
            ..basis
        };
        let texts: Vec<String> = promotion_awards(&short, combined)
            .into_iter()
            .map(|a| a.text)
            .collect();
        assert_eq!(texts, vec!["★증정★팻말 x1"]);
    }

    #[test]
    fn test_courier_a_view_has_no_sign() {
        let config = EngineConfig::default();
        let view = config.promotion("courier-a").unwrap();
        let basis = PromotionBasis {
            roll_length_m: 12.0,
            spend: 199_000,
            has_roll_or_puzzle: true,
        };
        let awards = promotion_awards(&basis, view);
        assert_eq!(awards.len(), 1);
        assert_eq!(awards[0].text, "★증정★테이프20mx1");
        assert_eq!(gift_text(&awards), "★증정★테이프20mx1");
    }
}
