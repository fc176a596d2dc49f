//! Engine configuration.
//!
//! Every business constant the rule engine depends on lives here so that
//! thresholds agreed with the business can change without touching code.
//! All sections default to the values the shop currently runs with.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::types::{Courier, PackingError, ProductCategory, Result};

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fields: FieldNames,
    pub products: ProductRules,
    pub packaging: PackagingRules,
    pub cutting: CuttingRules,
    pub fees: FeeRules,
    pub courier_policy: CourierPolicy,
    pub group_gift: GroupGiftRule,
    pub promotions: Vec<PromotionRules>,
    pub manifest: ManifestRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fields: FieldNames::default(),
            products: ProductRules::default(),
            packaging: PackagingRules::default(),
            cutting: CuttingRules::default(),
            fees: FeeRules::default(),
            courier_policy: CourierPolicy::default(),
            group_gift: GroupGiftRule::default(),
            promotions: default_promotions(),
            manifest: ManifestRules::default(),
        }
    }
}

impl EngineConfig {
    /// Checks internal consistency. Called once when a packer is built.
    pub fn validate(&self) -> Result<()> {
        self.packaging.validate()?;
        self.cutting.validate()?;
        self.fees.validate()?;

        if self.group_gift.lower.min_spend > self.group_gift.higher.min_spend {
            return Err(PackingError::InvalidConfig(
                "Group gift thresholds must be ascending".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for rules in &self.promotions {
            if !names.insert(rules.name.as_str()) {
                return Err(PackingError::InvalidConfig(format!(
                    "Promotion '{}' is defined twice",
                    rules.name
                )));
            }
            if let Some(tape) = &rules.tape {
                if tape.tiers.is_empty() {
                    return Err(PackingError::InvalidConfig(format!(
                        "Promotion '{}' has a tape rule without tiers",
                        rules.name
                    )));
                }
            }
        }

        for view in &self.manifest.views {
            if let Some(promotion) = &view.promotion {
                if !names.contains(promotion.as_str()) {
                    return Err(PackingError::InvalidConfig(format!(
                        "Manifest view '{}' references unknown promotion '{}'",
                        view.name, promotion
                    )));
                }
            }
        }

        if self.manifest.split_width == 0 {
            return Err(PackingError::InvalidConfig(
                "Manifest split width must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn promotion(&self, name: &str) -> Option<&PromotionRules> {
        self.promotions.iter().find(|p| p.name == name)
    }

    pub fn view(&self, name: &str) -> Option<&ManifestView> {
        self.manifest.views.iter().find(|v| v.name == name)
    }
}

/// Column names of the marketplace order export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub line_id: String,
    pub order_id: String,
    pub recipient_name: String,
    pub buyer_name: String,
    pub address: String,
    pub fallback_address: String,
    pub zip_code: String,
    pub phone: String,
    pub product_id: String,
    pub product_name: String,
    pub option_text: String,
    pub quantity: String,
    pub line_amount: String,
    pub delivery_memo: String,
    pub status: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            line_id: "상품주문번호".into(),
            order_id: "주문번호".into(),
            recipient_name: "수취인명".into(),
            buyer_name: "구매자명".into(),
            address: "통합배송지".into(),
            fallback_address: "배송지".into(),
            zip_code: "우편번호".into(),
            phone: "수취인연락처1".into(),
            product_id: "상품번호".into(),
            product_name: "상품명".into(),
            option_text: "옵션정보".into(),
            quantity: "수량".into(),
            line_amount: "최종 상품별 총 주문금액".into(),
            delivery_memo: "배송메세지".into(),
            status: "주문상태".into(),
        }
    }
}

/// Maps a marketplace product id to its catalog category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMapping {
    pub product_id: String,
    pub name: String,
    pub category: ProductCategory,
}

/// Product identity rules used by ingestion and classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRules {
    pub mappings: Vec<ProductMapping>,
    pub roll_product_ids: Vec<String>,
    pub puzzle_product_ids: Vec<String>,
    /// Roll mats sold in fixed sub-units that go through cutting normalization
    pub subunit_roll_product_ids: Vec<String>,
    pub finishing_product_ids: Vec<String>,
    pub tape_keywords: Vec<String>,
    pub cutting_keywords: Vec<String>,
    pub finishing_keywords: Vec<String>,
}

impl Default for ProductRules {
    fn default() -> Self {
        let mapping = |id: &str, name: &str, category| ProductMapping {
            product_id: id.into(),
            name: name.into(),
            category,
        };
        Self {
            mappings: vec![
                mapping("6092903705", "유아롤매트", ProductCategory::BabyRoll),
                mapping("4200445704", "애견롤매트", ProductCategory::PetRoll),
                mapping("6626596277", "롤매트", ProductCategory::Roll),
                mapping("5994906898", "퍼즐매트", ProductCategory::Puzzle),
                mapping("5994903887", "퍼즐매트", ProductCategory::Puzzle),
            ],
            roll_product_ids: vec!["6092903705".into(), "4200445704".into(), "6626596277".into()],
            puzzle_product_ids: vec!["5994906898".into(), "5994903887".into()],
            subunit_roll_product_ids: vec!["4200445704".into()],
            finishing_product_ids: vec!["5994906898".into(), "5994903887".into()],
            tape_keywords: vec!["테이프".into(), "tape".into()],
            cutting_keywords: vec![
                "재단".into(),
                "컷팅".into(),
                "커팅".into(),
                "잘라".into(),
                "등분".into(),
                "cut".into(),
            ],
            finishing_keywords: vec!["마감재".into(), "마감".into(), "엣지".into()],
        }
    }
}

impl ProductRules {
    pub fn mapping(&self, product_id: &str) -> Option<&ProductMapping> {
        self.mappings.iter().find(|m| m.product_id == product_id)
    }

    pub fn is_subunit_roll(&self, product_id: &str, category: ProductCategory) -> bool {
        category == ProductCategory::PetRoll
            || self.subunit_roll_product_ids.iter().any(|id| id == product_id)
    }
}

/// Length thresholds, in metres, for one thickness code
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub small: f64,
    pub large: f64,
    pub wrap: f64,
}

impl Thresholds {
    pub const fn new(small: f64, large: f64, wrap: f64) -> Self {
        Self { small, large, wrap }
    }
}

/// How combinable roll units are grouped into boxes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollCombineStrategy {
    /// Fill a running box until the large-box capacity is exceeded
    #[default]
    Greedy,
    /// Search contiguous partitions of the length-sorted units for the lowest total fee
    FeeOptimal,
}

/// Caps for the bounded partition searches
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    /// Puzzle counts above this use plain capacity filling
    pub puzzle_max_count: u32,
    /// Extra boxes tried beyond the minimum box count
    pub puzzle_box_slack: u32,
    /// When a box's quantity range is wider than this, only sample min/mid/max
    pub candidate_spread: u32,
    /// Roll unit counts above this use the greedy strategy
    pub roll_max_units: usize,
    pub roll_box_slack: usize,
    /// Hard cap on visited search nodes
    pub max_nodes: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            puzzle_max_count: 50,
            puzzle_box_slack: 3,
            candidate_spread: 10,
            roll_max_units: 20,
            roll_box_slack: 2,
            max_nodes: 200_000,
        }
    }
}

/// Packaging decisions and box capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingRules {
    /// Thresholds by thickness code
    pub thresholds: BTreeMap<u32, Thresholds>,
    /// Code whose thresholds apply to unlisted thicknesses
    pub fallback_thickness: u32,
    pub wrap_override_width_cm: u32,
    pub wrap_override_length_m: f64,
    /// Puzzle pieces per box by thickness code
    pub puzzle_capacity: BTreeMap<u32, u32>,
    pub default_puzzle_capacity: u32,
    pub default_puzzle_thickness: u32,
    pub default_puzzle_width_cm: u32,
    pub roll_strategy: RollCombineStrategy,
    pub search: SearchLimits,
}

impl Default for PackagingRules {
    fn default() -> Self {
        let thresholds = BTreeMap::from([
            (6, Thresholds::new(7.0, 15.0, 16.0)),
            (9, Thresholds::new(5.0, 11.0, 12.0)),
            (10, Thresholds::new(4.5, 10.0, 10.5)),
            (12, Thresholds::new(3.5, 8.0, 8.5)),
            (15, Thresholds::new(3.0, 6.5, 7.0)),
            (17, Thresholds::new(2.5, 6.0, 6.5)),
            (22, Thresholds::new(2.0, 4.5, 5.0)),
        ]);
        Self {
            thresholds,
            fallback_thickness: 17,
            wrap_override_width_cm: 140,
            wrap_override_length_m: 8.0,
            puzzle_capacity: BTreeMap::from([(25, 6), (40, 4)]),
            default_puzzle_capacity: 6,
            default_puzzle_thickness: 25,
            default_puzzle_width_cm: 100,
            roll_strategy: RollCombineStrategy::Greedy,
            search: SearchLimits::default(),
        }
    }
}

impl PackagingRules {
    /// Thresholds for a thickness code, falling back to the configured default code.
    pub fn thresholds_for(&self, thickness: u32) -> Thresholds {
        self.thresholds
            .get(&thickness)
            .or_else(|| self.thresholds.get(&self.fallback_thickness))
            .copied()
            .unwrap_or(Thresholds::new(2.5, 6.0, 6.5))
    }

    pub fn puzzle_capacity_for(&self, thickness: u32) -> u32 {
        self.puzzle_capacity
            .get(&thickness)
            .copied()
            .unwrap_or(self.default_puzzle_capacity)
    }

    fn validate(&self) -> Result<()> {
        if !self.thresholds.contains_key(&self.fallback_thickness) {
            return Err(PackingError::InvalidConfig(format!(
                "Fallback thickness {} has no thresholds",
                self.fallback_thickness
            )));
        }

        for (code, t) in &self.thresholds {
            if t.small <= 0.0 || t.small > t.large || t.large > t.wrap {
                return Err(PackingError::InvalidConfig(format!(
                    "Thresholds for thickness {} must satisfy 0 < small <= large <= wrap",
                    code
                )));
            }
        }

        if self.default_puzzle_capacity == 0 || self.puzzle_capacity.values().any(|c| *c == 0) {
            return Err(PackingError::InvalidConfig(
                "Puzzle box capacity must be greater than 0".to_string(),
            ));
        }

        if self.search.max_nodes == 0 {
            return Err(PackingError::InvalidConfig(
                "Search node cap must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Cutting normalization constants
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CuttingRules {
    pub default_unit_length_m: f64,
    pub tolerance_m: f64,
    /// Shortest piece a split directive may produce; finer splits leave the line uncut
    pub min_piece_m: f64,
}

impl Default for CuttingRules {
    fn default() -> Self {
        Self {
            default_unit_length_m: 0.5,
            tolerance_m: 0.05,
            min_piece_m: 0.1,
        }
    }
}

impl CuttingRules {
    fn validate(&self) -> Result<()> {
        if self.default_unit_length_m <= 0.0 || self.tolerance_m < 0.0 {
            return Err(PackingError::InvalidConfig(
                "Cutting unit length must be positive and tolerance non-negative".to_string(),
            ));
        }
        if self.min_piece_m < 0.001 {
            return Err(PackingError::InvalidConfig(
                "Minimum cut piece must be at least 1mm".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rate-table matching constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeRules {
    pub width_tolerance_cm: f64,
    pub thickness_tolerance_cm: f64,
    /// Added to a large-box fee when the box is too long and ships wrapped instead
    pub oversize_surcharge: u64,
    pub puzzle_packaging_type: String,
    /// Prefix shared by every wrap packaging descriptor
    pub wrap_descriptor: String,
    /// Marker identifying large-box rows
    pub large_box_marker: String,
}

impl Default for FeeRules {
    fn default() -> Self {
        Self {
            width_tolerance_cm: 5.0,
            thickness_tolerance_cm: 0.1,
            oversize_surcharge: 5000,
            puzzle_packaging_type: "강화비닐(100x100cm)".into(),
            wrap_descriptor: "강화비닐".into(),
            large_box_marker: "대박스".into(),
        }
    }
}

impl FeeRules {
    fn validate(&self) -> Result<()> {
        if self.width_tolerance_cm < 0.0 || self.thickness_tolerance_cm < 0.0 {
            return Err(PackingError::InvalidConfig(
                "Fee tolerances must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Courier assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CourierPolicy {
    /// Small boxes go to courier B, everything else to courier A
    TierOnly,
    /// Like `TierOnly`, but a lone uncombined unit of the given width goes to courier B
    TierWithWidthOverride { width_cm: u32 },
}

impl Default for CourierPolicy {
    fn default() -> Self {
        CourierPolicy::TierWithWidthOverride { width_cm: 70 }
    }
}

/// A single spend threshold and the award it grants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftThreshold {
    pub min_spend: u64,
    pub text: String,
}

/// Recipient-level award computed from qualifying roll-mat spend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupGiftRule {
    pub product_ids: Vec<String>,
    pub lower: GiftThreshold,
    pub higher: GiftThreshold,
}

impl Default for GroupGiftRule {
    fn default() -> Self {
        Self {
            product_ids: vec!["6092903705".into(), "4200445704".into()],
            lower: GiftThreshold {
                min_spend: 95_000,
                text: "실리콘테이프 1개".into(),
            },
            higher: GiftThreshold {
                min_spend: 500_000,
                text: "실리콘테이프 2개".into(),
            },
        }
    }
}

/// Which boxes a promotion aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PromotionScope {
    AllBoxes,
    Courier { courier: Courier },
}

/// Quantity the tape tiers are keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GiftMetric {
    RollLength,
    Spend,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantityTier {
    /// Lower bound in metres or currency units, depending on the metric
    pub min: f64,
    pub quantity: u32,
}

/// Tiered consolation item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapeGiftRule {
    pub min_roll_length_m: f64,
    pub min_spend: u64,
    pub metric: GiftMetric,
    pub tiers: Vec<QuantityTier>,
    /// `{n}` is replaced by the tier quantity
    pub template: String,
}

/// Single-unit item for roll or puzzle buyers above a spend threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignGiftRule {
    pub min_spend: u64,
    pub text: String,
}

/// Promotion thresholds of one export view.
///
/// The views have drifted apart over time; each keeps its own numbers until
/// the business confirms a single rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRules {
    pub name: String,
    pub scope: PromotionScope,
    pub roll_product_ids: Vec<String>,
    #[serde(default)]
    pub puzzle_product_ids: Vec<String>,
    #[serde(default)]
    pub tape: Option<TapeGiftRule>,
    #[serde(default)]
    pub sign: Option<SignGiftRule>,
}

fn default_tape_tiers() -> Vec<QuantityTier> {
    vec![
        QuantityTier {
            min: 10.0,
            quantity: 1,
        },
        QuantityTier {
            min: 30.0,
            quantity: 2,
        },
        QuantityTier {
            min: 50.0,
            quantity: 3,
        },
    ]
}

fn default_promotions() -> Vec<PromotionRules> {
    let roll_ids: Vec<String> = vec!["6092903705".into(), "6626596277".into(), "4200445704".into()];
    vec![
        PromotionRules {
            name: "combined".into(),
            scope: PromotionScope::AllBoxes,
            roll_product_ids: roll_ids.clone(),
            puzzle_product_ids: vec!["5994906898".into()],
            tape: Some(TapeGiftRule {
                min_roll_length_m: 10.0,
                min_spend: 195_000,
                metric: GiftMetric::RollLength,
                tiers: default_tape_tiers(),
                template: "★증정★테이프20m x{n}".into(),
            }),
            sign: Some(SignGiftRule {
                min_spend: 200_000,
                text: "★증정★팻말 x1".into(),
            }),
        },
        PromotionRules {
            name: "courier-a".into(),
            scope: PromotionScope::Courier {
                courier: Courier::CourierA,
            },
            roll_product_ids: roll_ids,
            puzzle_product_ids: Vec::new(),
            tape: Some(TapeGiftRule {
                min_roll_length_m: 10.0,
                min_spend: 195_000,
                metric: GiftMetric::RollLength,
                tiers: default_tape_tiers(),
                template: "★증정★테이프20mx{n}".into(),
            }),
            sign: None,
        },
    ]
}

/// A downstream manifest layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestView {
    pub name: String,
    /// Only boxes for this courier; all boxes when absent
    #[serde(default)]
    pub courier: Option<Courier>,
    /// Promotion rule set whose gift text goes on the rows
    #[serde(default)]
    pub promotion: Option<String>,
}

/// Manifest row rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestRules {
    /// Content text at or beyond this many characters is split into continuation rows
    pub split_width: usize,
    pub fragile_memo_prefix: String,
    pub wrap_text: String,
    pub box_text: String,
    pub views: Vec<ManifestView>,
}

impl Default for ManifestRules {
    fn default() -> Self {
        Self {
            split_width: 30,
            fragile_memo_prefix: "★파손주의★".into(),
            wrap_text: "비닐".into(),
            box_text: "박스".into(),
            views: vec![
                ManifestView {
                    name: "combined".into(),
                    courier: None,
                    promotion: Some("combined".into()),
                },
                ManifestView {
                    name: "courier-a".into(),
                    courier: Some(Courier::CourierA),
                    promotion: Some("courier-a".into()),
                },
                ManifestView {
                    name: "courier-b".into(),
                    courier: Some(Courier::CourierB),
                    promotion: None,
                },
            ],
        }
    }
}
