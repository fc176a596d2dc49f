use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{EngineConfig, ProductRules};
use crate::gift::group_gift;
use crate::types::{GiftAward, LineClass, OrderLine, Recipient, RecipientKey, Warning};

/// All lines shipping to one (name, address, phone) identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientGroup {
    pub key: RecipientKey,
    /// Recipient fields of the first line seen for this key
    pub recipient: Recipient,
    pub order_id: String,
    pub lines: Vec<Arc<OrderLine>>,
    pub roll_mats: Vec<Arc<OrderLine>>,
    pub puzzle_mats: Vec<Arc<OrderLine>>,
    pub tapes: Vec<Arc<OrderLine>>,
    pub others: Vec<Arc<OrderLine>>,
    pub total_price: u64,
    /// Distinct trimmed memos in first-seen order
    pub delivery_memos: Vec<String>,
    pub has_cutting_request: bool,
    pub has_finishing_request: bool,
    pub group_gift: Option<GiftAward>,
    /// Distinct warnings across the group's boxes, filled once packing is done
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl RecipientGroup {
    fn new(line: &OrderLine) -> Self {
        Self {
            key: line.recipient.key(),
            recipient: line.recipient.clone(),
            order_id: line.order_id.clone(),
            lines: Vec::new(),
            roll_mats: Vec::new(),
            puzzle_mats: Vec::new(),
            tapes: Vec::new(),
            others: Vec::new(),
            total_price: 0,
            delivery_memos: Vec::new(),
            has_cutting_request: false,
            has_finishing_request: false,
            group_gift: None,
            warnings: Vec::new(),
        }
    }

    fn push(&mut self, line: Arc<OrderLine>, class: LineClass) {
        self.total_price += line.price;
        if let Some(memo) = line.memo() {
            if !self.delivery_memos.iter().any(|m| m == memo) {
                self.delivery_memos.push(memo.to_string());
            }
        }
        self.has_cutting_request |= line.has_cutting_request;
        self.has_finishing_request |= line.has_finishing_request;

        match class {
            LineClass::RollMat => self.roll_mats.push(line.clone()),
            LineClass::PuzzleMat => self.puzzle_mats.push(line.clone()),
            LineClass::Tape => self.tapes.push(line.clone()),
            LineClass::Other => self.others.push(line.clone()),
        }
        self.lines.push(line);
    }

    pub(crate) fn add_warning(&mut self, warning: &Warning) {
        if !self.warnings.contains(warning) {
            self.warnings.push(warning.clone());
        }
    }

    pub fn name(&self) -> &str {
        &self.recipient.name
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Classifies a line: tape keyword first, then roll mat, then puzzle mat.
pub fn classify_line(line: &OrderLine, products: &ProductRules) -> LineClass {
    let text = line.search_text();
    if products
        .tape_keywords
        .iter()
        .any(|k| text.contains(&k.to_lowercase()))
    {
        LineClass::Tape
    } else if line.category.is_roll() || products.roll_product_ids.contains(&line.product_id) {
        LineClass::RollMat
    } else if line.category.is_puzzle() || products.puzzle_product_ids.contains(&line.product_id)
    {
        LineClass::PuzzleMat
    } else {
        LineClass::Other
    }
}

/// Partitions lines by recipient identity, keeping first-seen group order.
pub fn group_by_recipient(lines: &[OrderLine], config: &EngineConfig) -> Vec<RecipientGroup> {
    let mut groups: Vec<RecipientGroup> = Vec::new();
    let mut index: HashMap<RecipientKey, usize> = HashMap::new();

    for line in lines {
        let key = line.recipient.key();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(RecipientGroup::new(line));
            groups.len() - 1
        });
        let class = classify_line(line, &config.products);
        groups[slot].push(Arc::new(line.clone()), class);
    }

    for group in &mut groups {
        group.group_gift = group_gift(&group.lines, &config.group_gift);
        debug!(
            recipient = group.name(),
            lines = group.line_count(),
            total_price = group.total_price,
            "Grouped recipient"
        );
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductCategory;

    fn line(id: &str, name: &str, product_id: &str, category: ProductCategory) -> OrderLine {
        OrderLine {
            line_id: id.into(),
            recipient: Recipient {
                name: name.into(),
                address: "서울".into(),
                phone: "010".into(),
                zip_code: String::new(),
            },
            product_id: product_id.into(),
            product_name: "상품".into(),
            category,
            quantity: 1,
            price: 10_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let config = EngineConfig::default();
        let lines = vec![
            line("1", "B", "x", ProductCategory::Other),
            line("2", "A", "x", ProductCategory::Other),
            line("3", "B", "x", ProductCategory::Other),
        ];
        let groups = group_by_recipient(&lines, &config);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name(), "B");
        assert_eq!(groups[0].line_count(), 2);
        assert_eq!(groups[0].total_price, 20_000);
        assert_eq!(groups[1].name(), "A");
    }

    #[test]
    fn test_different_phone_is_a_different_group() {
        let config = EngineConfig::default();
        let mut other = line("2", "A", "x", ProductCategory::Other);
        other.recipient.phone = "011".into();
        let groups = group_by_recipient(&[line("1", "A", "x", ProductCategory::Other), other], &config);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_classification_precedence() {
        let products = ProductRules::default();

        let mut tape_named_roll = line("1", "A", "6092903705", ProductCategory::BabyRoll);
        tape_named_roll.option_text = "실리콘 테이프 추가".into();
        assert_eq!(classify_line(&tape_named_roll, &products), LineClass::Tape);

        let roll = line("2", "A", "6092903705", ProductCategory::Other);
        assert_eq!(classify_line(&roll, &products), LineClass::RollMat);

        let puzzle = line("3", "A", "5994906898", ProductCategory::Other);
        assert_eq!(classify_line(&puzzle, &products), LineClass::PuzzleMat);

        let pe = line("4", "A", "999", ProductCategory::PeRoll);
        assert_eq!(classify_line(&pe, &products), LineClass::RollMat);

        let other = line("5", "A", "999", ProductCategory::Tpu);
        assert_eq!(classify_line(&other, &products), LineClass::Other);
    }

    #[test]
    fn test_memos_are_deduplicated() {
        let config = EngineConfig::default();
        let mut a = line("1", "A", "x", ProductCategory::Other);
        a.delivery_memo = " 문 앞 ".into();
        let mut b = line("2", "A", "x", ProductCategory::Other);
        b.delivery_memo = "문 앞".into();
        let groups = group_by_recipient(&[a, b], &config);
        assert_eq!(groups[0].delivery_memos, vec!["문 앞".to_string()]);
    }
}
