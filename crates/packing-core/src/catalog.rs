use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::types::{CatalogEntry, DesignCode, OrderLine};

static UNDERSCORE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Design-code catalog indexed by product id.
///
/// Lookups never fail: a line without a matching row yields
/// [`DesignCode::Unregistered`].
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_product: HashMap<String, Vec<CatalogEntry>>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut by_product: HashMap<String, Vec<CatalogEntry>> = HashMap::new();
        let mut skipped = 0usize;
        for entry in entries {
            let product_id = entry.product_id.trim().to_string();
            if product_id.is_empty()
                || entry.option_text.trim().is_empty()
                || entry.design_code.trim().is_empty()
            {
                skipped += 1;
                continue;
            }
            by_product.entry(product_id).or_default().push(entry);
        }
        if skipped > 0 {
            debug!(skipped, "Skipped incomplete catalog rows");
        }
        Self { by_product }
    }

    pub fn len(&self) -> usize {
        self.by_product.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty()
    }

    /// Finds the catalog row for a line: exact option text first, then the
    /// emoji-normalized form.
    pub fn lookup(&self, line: &OrderLine) -> Option<&CatalogEntry> {
        let option = line.option_text.trim();
        if option.is_empty() {
            return None;
        }
        let candidates = self.by_product.get(line.product_id.trim())?;
        let normalized = normalize_for_matching(option);

        candidates.iter().find(|entry| {
            let stored = entry.option_text.trim();
            stored == option || normalize_for_matching(stored) == normalized
        })
    }

    pub fn design_code(&self, line: &OrderLine) -> DesignCode {
        match self.lookup(line) {
            Some(entry) => DesignCode::Registered(entry.design_code.trim().to_string()),
            None => DesignCode::Unregistered,
        }
    }

    /// Declared length of one sold unit, if the catalog carries one.
    pub fn declared_length(&self, line: &OrderLine) -> Option<f64> {
        self.lookup(line)
            .and_then(|entry| entry.length_m)
            .filter(|l| *l > 0.0)
    }
}

fn is_pictograph(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1F9FF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
            | 0x1F000..=0x1F02F
            | 0x1F0A0..=0x1F0FF
    )
}

fn is_invisible_modifier(c: char) -> bool {
    matches!(
        c as u32,
        0xFE00..=0xFE0F | 0x200D | 0x20E3 | 0xE0020..=0xE007F
    )
}

/// Normalizes option text for comparison.
///
/// Pictographs become `_`, invisible modifiers are removed and any run of
/// underscores collapses to exactly two, so `🏆BEST🏆` and `__BEST__` compare
/// equal.
pub fn normalize_for_matching(text: &str) -> String {
    let replaced: String = text
        .chars()
        .filter(|c| !is_invisible_modifier(*c))
        .map(|c| if is_pictograph(c) { '_' } else { c })
        .collect();
    UNDERSCORE_RUN
        .replace_all(&replaced, "__")
        .trim()
        .to_string()
}
