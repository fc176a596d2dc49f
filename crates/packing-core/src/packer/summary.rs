use serde::{Deserialize, Serialize};

use super::PackedBox;
use crate::grouping::RecipientGroup;
use crate::types::Courier;

/// Aggregate figures of one packing pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackingSummary {
    pub recipients: usize,
    pub lines: usize,
    pub boxes: usize,
    pub courier_a_boxes: usize,
    pub courier_b_boxes: usize,
    /// Boxes no fee rule matched
    pub unresolved_fees: usize,
    pub warnings: usize,
    pub total_fee: u64,
    pub group_gifts: usize,
}

impl PackingSummary {
    /// Computes counts and totals over the finished boxes.
    pub fn from_boxes(groups: &[RecipientGroup], boxes: &[PackedBox]) -> Self {
        let per_courier = |courier: Courier| boxes.iter().filter(|b| b.courier == courier).count();

        Self {
            recipients: groups.len(),
            lines: groups.iter().map(RecipientGroup::line_count).sum(),
            boxes: boxes.len(),
            courier_a_boxes: per_courier(Courier::CourierA),
            courier_b_boxes: per_courier(Courier::CourierB),
            unresolved_fees: boxes.iter().filter(|b| !b.fee.is_resolved()).count(),
            warnings: boxes.iter().map(|b| b.warnings.len()).sum(),
            total_fee: boxes.iter().map(|b| b.fee.amount()).sum(),
            group_gifts: groups.iter().filter(|g| g.group_gift.is_some()).count(),
        }
    }
}
