use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{EngineConfig, PackagingRules, RollCombineStrategy};
use crate::cutting::normalize_cutting;
use crate::fee::{resolve_fee, validate_fee_table, FeeProfile, FeeQuote};
use crate::grouping::{group_by_recipient, RecipientGroup};
use crate::ingest::parse_records;
use crate::tier::{resolve_combined_tier, resolve_tier};
use crate::types::*;

mod label;
mod puzzle;
mod roll;
mod summary;

pub use label::{assign_courier, box_label};
pub use puzzle::{fill_by_capacity, find_optimal_puzzle_split};
pub use roll::{combine_fee_optimal, combine_greedy};
pub use summary::PackingSummary;

/// Read-only reference tables shared by every packing pass
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub fee_table: Vec<ShippingFeeRule>,
    pub catalog: Catalog,
}

impl ReferenceData {
    pub fn new(fee_table: Vec<ShippingFeeRule>, catalog: Vec<CatalogEntry>) -> Self {
        Self {
            fee_table,
            catalog: Catalog::new(catalog),
        }
    }
}

/// One quantity-bearing slice of an order line inside a box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackUnit {
    pub line: Arc<OrderLine>,
    pub class: LineClass,
    pub quantity: u32,
    /// Length of one unit in metres
    pub length_m: f64,
    pub design_code: DesignCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl PackUnit {
    fn new(line: &Arc<OrderLine>, class: LineClass, quantity: u32, length_m: f64, catalog: &Catalog) -> Self {
        Self {
            line: Arc::clone(line),
            class,
            quantity,
            length_m,
            design_code: catalog.design_code(line),
            warnings: Vec::new(),
        }
    }

    pub fn total_length(&self) -> f64 {
        self.length_m * f64::from(self.quantity)
    }
}

/// What a box was assembled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoxKind {
    Roll,
    Puzzle,
    Other,
    /// Fallback box holding only tape
    Tape,
}

/// A finished shipping unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackedBox {
    /// Index of the owning group in [`PackingResult::groups`]
    pub group: usize,
    pub recipient_name: String,
    pub kind: BoxKind,
    pub units: Vec<PackUnit>,
    pub tier: PackagingTier,
    pub fragile: bool,
    pub combined: bool,
    pub design_text: String,
    /// 1-based position among the recipient's boxes
    pub ordinal: usize,
    pub box_count: usize,
    pub label: String,
    pub delivery_memos: Vec<String>,
    pub courier: Courier,
    pub fee: FeeQuote,
    pub gifts: Vec<GiftAward>,
    pub warnings: Vec<Warning>,
}

impl PackedBox {
    pub fn quantity(&self) -> u32 {
        self.units.iter().map(|u| u.quantity).sum()
    }

    /// Ids of the distinct lines contributing to this box
    pub fn line_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !ids.contains(&unit.line.line_id.as_str()) {
                ids.push(&unit.line.line_id);
            }
        }
        ids
    }
}

/// Output of one packing pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingResult {
    pub groups: Vec<RecipientGroup>,
    pub boxes: Vec<PackedBox>,
    pub summary: PackingSummary,
}

impl PackingResult {
    pub fn boxes_for(&self, group: usize) -> impl Iterator<Item = &PackedBox> {
        self.boxes.iter().filter(move |b| b.group == group)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &PackedBox> {
        self.boxes.iter().filter(|b| !b.fee.is_resolved())
    }
}

/// Box under construction, before labels, couriers and fees are known
#[derive(Debug, Clone)]
struct DraftBox {
    kind: BoxKind,
    units: Vec<PackUnit>,
    tier: PackagingTier,
    fragile: bool,
    combined: bool,
    design_text: String,
}

/// Packs order lines into labeled, priced boxes.
pub struct Packer {
    reference: Arc<ReferenceData>,
    config: EngineConfig,
}

impl Packer {
    /// Validates configuration and reference data and builds a new packer.
    pub fn new(reference: impl Into<Arc<ReferenceData>>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let reference = reference.into();
        validate_fee_table(&reference.fee_table)?;

        debug!(
            fee_rules = reference.fee_table.len(),
            catalog_entries = reference.catalog.len(),
            "Packer ready"
        );
        Ok(Self { reference, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// Runs the full pipeline over `lines`. Every call recomputes from scratch.
    pub fn pack(&self, lines: &[OrderLine]) -> PackingResult {
        compute_packing(
            lines,
            &self.reference.fee_table,
            &self.reference.catalog,
            &self.config,
        )
    }

    /// Parses field-keyed records, then packs the surviving lines.
    pub fn pack_records(&self, records: &[RawRecord]) -> PackingResult {
        let lines = parse_records(records, &self.config);
        if lines.len() < records.len() {
            warn!(
                dropped = records.len() - lines.len(),
                "Some records were dropped during ingestion"
            );
        }
        self.pack(&lines)
    }
}

/// Groups, cuts, tiers, assembles, labels and prices `lines`.
///
/// Total over its input: bad records, catalog misses and fee misses degrade
/// single boxes, never the pass.
pub fn compute_packing(
    lines: &[OrderLine],
    fee_table: &[ShippingFeeRule],
    catalog: &Catalog,
    config: &EngineConfig,
) -> PackingResult {
    let ctx = PackContext {
        fee_table,
        catalog,
        config,
    };

    let mut groups = group_by_recipient(lines, config);
    let boxes: Vec<PackedBox> = groups
        .iter()
        .enumerate()
        .flat_map(|(idx, group)| ctx.pack_group(idx, group))
        .collect();
    for packed in &boxes {
        for warning in &packed.warnings {
            groups[packed.group].add_warning(warning);
        }
    }
    let summary = PackingSummary::from_boxes(&groups, &boxes);

    info!(
        recipients = summary.recipients,
        boxes = summary.boxes,
        unresolved_fees = summary.unresolved_fees,
        total_fee = summary.total_fee,
        "Packing pass complete"
    );

    PackingResult {
        groups,
        boxes,
        summary,
    }
}

struct PackContext<'a> {
    fee_table: &'a [ShippingFeeRule],
    catalog: &'a Catalog,
    config: &'a EngineConfig,
}

impl PackContext<'_> {
    fn pack_group(&self, idx: usize, group: &RecipientGroup) -> Vec<PackedBox> {
        let mut drafts = self.assemble_rolls(self.roll_units(group));
        drafts.extend(self.assemble_puzzles(group));
        drafts.extend(self.assemble_others(group));
        self.attach_tapes(group, &mut drafts);
        self.finish(idx, group, drafts)
    }

    fn quote(&self, profile: Option<FeeProfile>) -> FeeQuote {
        profile
            .map(|p| resolve_fee(&p, self.fee_table, &self.config.fees))
            .unwrap_or(FeeQuote::Unresolved)
    }

    /// Total fee of a set of units, or `None` when the rate table has no answer.
    fn priced(&self, units: &[PackUnit]) -> Option<u64> {
        let quote = self.quote(FeeProfile::from_units(units, &self.config.fees));
        quote.is_resolved().then(|| quote.amount())
    }

    /// Expands roll lines into single-unit pieces, cutting sub-unit rolls per memo.
    fn roll_units(&self, group: &RecipientGroup) -> Vec<PackUnit> {
        let products = &self.config.products;
        let mut units = Vec::new();

        for line in &group.roll_mats {
            if products.is_subunit_roll(&line.product_id, line.category) {
                let unit_length = if line.length_m > 0.0 {
                    line.length_m
                } else {
                    self.catalog
                        .declared_length(line)
                        .unwrap_or(self.config.cutting.default_unit_length_m)
                };
                let plan = normalize_cutting(
                    line.quantity,
                    unit_length,
                    &line.delivery_memo,
                    &self.config.cutting,
                );
                for length in &plan.segments {
                    let mut unit = PackUnit::new(line, LineClass::RollMat, 1, *length, self.catalog);
                    unit.warnings = plan.warnings.clone();
                    units.push(unit);
                }
            } else {
                for _ in 0..line.quantity {
                    units.push(PackUnit::new(
                        line,
                        LineClass::RollMat,
                        1,
                        line.length_m,
                        self.catalog,
                    ));
                }
            }
        }

        units
    }

    fn assemble_rolls(&self, units: Vec<PackUnit>) -> Vec<DraftBox> {
        let rules = &self.config.packaging;
        let mut drafts = Vec::new();
        let mut pool = Vec::new();

        for unit in units {
            let decision = resolve_tier(unit.line.thickness, unit.length_m, unit.line.width_cm, rules);
            if decision.combinable {
                pool.push(unit);
            } else {
                let units = vec![unit];
                drafts.push(DraftBox {
                    kind: BoxKind::Roll,
                    design_text: roll_design_text(&units),
                    units,
                    tier: decision.tier,
                    fragile: decision.fragile,
                    combined: false,
                });
            }
        }

        let bins = match rules.roll_strategy {
            RollCombineStrategy::Greedy => combine_greedy(pool, rules),
            RollCombineStrategy::FeeOptimal => combine_fee_optimal(pool, rules, |bin| self.priced(bin)),
        };

        for bin in bins {
            let max_thickness = bin
                .iter()
                .map(|u| effective_thickness(u.line.thickness, rules))
                .max()
                .unwrap_or(rules.fallback_thickness);
            let total: f64 = bin.iter().map(PackUnit::total_length).sum();
            let (tier, fragile) = resolve_combined_tier(max_thickness, round_meters(total), rules);
            drafts.push(DraftBox {
                kind: BoxKind::Roll,
                design_text: roll_design_text(&bin),
                combined: bin.len() > 1,
                units: bin,
                tier,
                fragile,
            });
        }

        drafts
    }

    fn assemble_puzzles(&self, group: &RecipientGroup) -> Vec<DraftBox> {
        if group.puzzle_mats.is_empty() {
            return Vec::new();
        }
        let rules = &self.config.packaging;

        let total: u32 = group.puzzle_mats.iter().map(|l| l.quantity).sum();
        let thickness = group
            .puzzle_mats
            .iter()
            .map(|l| l.thickness)
            .filter(|t| *t > 0)
            .max()
            .unwrap_or(rules.default_puzzle_thickness);
        let width = group
            .puzzle_mats
            .iter()
            .map(|l| l.width_cm)
            .find(|w| *w > 0)
            .unwrap_or(rules.default_puzzle_width_cm);
        let capacity = rules.puzzle_capacity_for(thickness);

        let split = find_optimal_puzzle_split(total, capacity, &rules.search, |count| {
            let quote = self.quote(Some(FeeProfile::puzzle(
                count,
                width,
                thickness,
                &self.config.fees,
            )));
            quote.is_resolved().then(|| quote.amount())
        });
        debug!(recipient = group.name(), total, capacity, ?split, "Puzzle split chosen");

        let mut remaining: Vec<u32> = group.puzzle_mats.iter().map(|l| l.quantity).collect();
        let mut cursor = 0;
        let mut drafts = Vec::new();

        for target in split {
            let mut units = Vec::new();
            let mut wanted = target;
            while wanted > 0 && cursor < remaining.len() {
                let take = remaining[cursor].min(wanted);
                if take > 0 {
                    let line = &group.puzzle_mats[cursor];
                    units.push(PackUnit::new(line, LineClass::PuzzleMat, take, line.length_m, self.catalog));
                    remaining[cursor] -= take;
                    wanted -= take;
                }
                if remaining[cursor] == 0 {
                    cursor += 1;
                }
            }
            if units.is_empty() {
                continue;
            }
            let design_text = units
                .iter()
                .map(|u| u.design_code.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            drafts.push(DraftBox {
                kind: BoxKind::Puzzle,
                units,
                tier: PackagingTier::Wrap,
                fragile: false,
                combined: false,
                design_text,
            });
        }

        drafts
    }

    fn assemble_others(&self, group: &RecipientGroup) -> Vec<DraftBox> {
        let mut drafts = Vec::new();
        for line in &group.others {
            for _ in 0..line.quantity {
                let unit = PackUnit::new(line, LineClass::Other, 1, line.length_m, self.catalog);
                drafts.push(DraftBox {
                    kind: BoxKind::Other,
                    design_text: unit.design_code.to_string(),
                    units: vec![unit],
                    tier: PackagingTier::LargeBox,
                    fragile: false,
                    combined: false,
                });
            }
        }
        drafts
    }

    /// Tape rides along in the last box, or gets a small box of its own.
    fn attach_tapes(&self, group: &RecipientGroup, drafts: &mut Vec<DraftBox>) {
        if group.tapes.is_empty() {
            return;
        }
        let units: Vec<PackUnit> = group
            .tapes
            .iter()
            .map(|line| PackUnit::new(line, LineClass::Tape, line.quantity, line.length_m, self.catalog))
            .collect();
        let tape_text = units
            .iter()
            .map(|u| u.design_code.to_string())
            .collect::<Vec<_>>()
            .join("+");

        match drafts.last_mut() {
            Some(last) => {
                last.units.extend(units);
                last.combined = true;
                last.design_text.push('+');
                last.design_text.push_str(&tape_text);
            }
            None => drafts.push(DraftBox {
                kind: BoxKind::Tape,
                units,
                tier: PackagingTier::SmallBox,
                fragile: false,
                combined: true,
                design_text: tape_text,
            }),
        }
    }

    fn finish(&self, idx: usize, group: &RecipientGroup, drafts: Vec<DraftBox>) -> Vec<PackedBox> {
        let box_count = drafts.len();
        let group_warnings: Vec<Warning> = if group.has_cutting_request {
            vec![Warning::CuttingRequest {
                memos: group.delivery_memos.clone(),
            }]
        } else {
            Vec::new()
        };

        drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                let ordinal = i + 1;
                let fee = self.quote(FeeProfile::from_units(&draft.units, &self.config.fees));
                if !fee.is_resolved() {
                    warn!(
                        recipient = group.name(),
                        ordinal,
                        design = %draft.design_text,
                        "No shipping fee rule matched"
                    );
                }

                let mut warnings = group_warnings.clone();
                for warning in draft.units.iter().flat_map(|u| &u.warnings) {
                    if !warnings.contains(warning) {
                        warnings.push(warning.clone());
                    }
                }

                PackedBox {
                    group: idx,
                    recipient_name: group.name().to_string(),
                    label: box_label(group.name(), ordinal, box_count, draft.fragile),
                    courier: assign_courier(
                        draft.tier,
                        draft.combined,
                        &draft.units,
                        &self.config.courier_policy,
                    ),
                    delivery_memos: box_memos(&draft.units),
                    gifts: if i == 0 {
                        group.group_gift.iter().cloned().collect()
                    } else {
                        Vec::new()
                    },
                    kind: draft.kind,
                    units: draft.units,
                    tier: draft.tier,
                    fragile: draft.fragile,
                    combined: draft.combined,
                    design_text: draft.design_text,
                    ordinal,
                    box_count,
                    fee,
                    warnings,
                }
            })
            .collect()
    }
}

/// Unknown thickness packs like the fallback code.
pub(crate) fn effective_thickness(thickness: u32, rules: &PackagingRules) -> u32 {
    if thickness == 0 {
        rules.fallback_thickness
    } else {
        thickness
    }
}

/// `{code}{len}m` per distinct (code, length), with an ` xN` suffix for repeats.
fn roll_design_text(units: &[PackUnit]) -> String {
    let mut entries: Vec<(String, f64, u32)> = Vec::new();
    for unit in units {
        let code = unit.design_code.to_string();
        let length = round_meters(unit.length_m);
        match entries.iter_mut().find(|(c, l, _)| *c == code && *l == length) {
            Some(entry) => entry.2 += unit.quantity,
            None => entries.push((code, length, unit.quantity)),
        }
    }
    entries
        .into_iter()
        .map(|(code, length, qty)| {
            let mut text = code;
            if length > 0.0 {
                text.push_str(&format!("{}m", format_meters(length)));
            }
            if qty > 1 {
                text.push_str(&format!(" x{}", qty));
            }
            text
        })
        .collect::<Vec<_>>()
        .join(" / ")
}

fn box_memos(units: &[PackUnit]) -> Vec<String> {
    let mut memos: Vec<String> = Vec::new();
    for memo in units.iter().filter_map(|u| u.line.memo()) {
        if !memos.iter().any(|m| m == memo) {
            memos.push(memo.to_string());
        }
    }
    memos
}
