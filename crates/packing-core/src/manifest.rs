//! Courier manifest rows.
//!
//! Column layout is a downstream concern; a row carries every field any
//! current view prints.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::config::{EngineConfig, ManifestView};
use crate::gift::{gift_text, promotion_gifts};
use crate::packer::{PackUnit, PackedBox, PackingResult};
use crate::types::{format_meters, round_meters, Courier, LineClass, PackagingTier};

/// One design/length entry of a box's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub design_code: String,
    /// Metres per piece; `None` for tape and unmeasured items
    pub length_m: Option<f64>,
    pub quantity: u32,
}

impl ContentEntry {
    pub fn text(&self) -> String {
        match self.length_m {
            Some(length) => format!(
                "{} {}m x{}",
                self.design_code,
                format_meters(length),
                self.quantity
            ),
            None => format!("{} x{}", self.design_code, self.quantity),
        }
    }
}

/// A manifest row. Continuation rows leave recipient fields blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub order_id: String,
    pub label: String,
    pub address: String,
    pub phone: String,
    pub zip_code: String,
    pub packaging: String,
    pub fee: Option<u64>,
    pub gift: String,
    pub content: String,
    pub memo: String,
    pub combined: bool,
    pub courier: Courier,
    pub continuation: bool,
}

/// Groups a box's units by (design code, length), summing quantities.
pub fn content_entries(units: &[PackUnit]) -> Vec<ContentEntry> {
    let mut entries: Vec<ContentEntry> = Vec::new();
    for unit in units {
        let design_code = unit.design_code.to_string();
        let length_m = (unit.class != LineClass::Tape && unit.length_m > 0.0)
            .then(|| round_meters(unit.length_m));
        match entries
            .iter_mut()
            .find(|e| e.design_code == design_code && e.length_m == length_m)
        {
            Some(entry) => entry.quantity += unit.quantity,
            None => entries.push(ContentEntry {
                design_code,
                length_m,
                quantity: unit.quantity,
            }),
        }
    }
    entries
}

/// Builds the rows of one view over a packing result.
///
/// Gift text goes on the first row of each recipient's first box in the
/// view. Content at or beyond the split width becomes one row per entry.
pub fn build_manifest(
    result: &PackingResult,
    view: &ManifestView,
    config: &EngineConfig,
) -> Vec<ManifestRow> {
    let rules = &config.manifest;
    let promotion = view.promotion.as_deref().and_then(|name| config.promotion(name));

    let mut rows = Vec::new();
    let mut gifted: HashSet<usize> = HashSet::new();

    for packed in result
        .boxes
        .iter()
        .filter(|b| view.courier.map_or(true, |c| b.courier == c))
    {
        let gift = if gifted.insert(packed.group) {
            let mut awards: Vec<_> = result
                .boxes_for(packed.group)
                .flat_map(|b| b.gifts.iter().cloned())
                .collect();
            if let Some(rules) = promotion {
                awards.extend(promotion_gifts(result, packed.group, rules));
            }
            gift_text(&awards)
        } else {
            String::new()
        };

        let entries = content_entries(&packed.units);
        let texts: Vec<String> = entries.iter().map(ContentEntry::text).collect();
        let content = texts.join(" / ");

        let first = header_row(result, packed, config, gift);
        if content.chars().count() >= rules.split_width && texts.len() > 1 {
            debug!(label = %packed.label, entries = texts.len(), "Splitting long content");
            let mut texts = texts.into_iter();
            rows.push(ManifestRow {
                content: texts.next().unwrap_or_default(),
                ..first
            });
            rows.extend(texts.map(|content| continuation_row(packed.courier, content)));
        } else {
            rows.push(ManifestRow { content, ..first });
        }
    }

    rows
}

fn header_row(result: &PackingResult, packed: &PackedBox, config: &EngineConfig, gift: String) -> ManifestRow {
    let rules = &config.manifest;
    let group = &result.groups[packed.group];

    let memo = packed.delivery_memos.join(" / ");
    let memo = match (packed.fragile, memo.is_empty()) {
        (true, true) => rules.fragile_memo_prefix.clone(),
        (true, false) => format!("{} {}", rules.fragile_memo_prefix, memo),
        (false, _) => memo,
    };

    ManifestRow {
        order_id: group.order_id.clone(),
        label: packed.label.clone(),
        address: group.recipient.address.clone(),
        phone: group.recipient.phone.clone(),
        zip_code: group.recipient.zip_code.clone(),
        packaging: if packed.tier == PackagingTier::Wrap {
            rules.wrap_text.clone()
        } else {
            rules.box_text.clone()
        },
        fee: Some(packed.fee.amount()),
        gift,
        content: String::new(),
        memo,
        combined: packed.combined,
        courier: packed.courier,
        continuation: false,
    }
}

fn continuation_row(courier: Courier, content: String) -> ManifestRow {
    ManifestRow {
        order_id: String::new(),
        label: String::new(),
        address: String::new(),
        phone: String::new(),
        zip_code: String::new(),
        packaging: String::new(),
        fee: None,
        gift: String::new(),
        content,
        memo: String::new(),
        combined: false,
        courier,
        continuation: true,
    }
}
