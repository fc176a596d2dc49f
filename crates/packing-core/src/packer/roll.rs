use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use super::{effective_thickness, PackUnit};
use crate::config::PackagingRules;

const EPSILON: f64 = 1e-9;

/// Fills a running box until adding the next unit would exceed the large-box
/// capacity of the thickest unit so far, then starts a new box.
pub fn combine_greedy(units: Vec<PackUnit>, rules: &PackagingRules) -> Vec<Vec<PackUnit>> {
    let mut bins = Vec::new();
    let mut current: Vec<PackUnit> = Vec::new();
    let mut current_length = 0.0;
    let mut current_thickness = 0;

    for unit in units {
        let thickness = current_thickness.max(effective_thickness(unit.line.thickness, rules));
        let capacity = rules.thresholds_for(thickness).large;
        let length = unit.total_length();

        if !current.is_empty() && current_length + length > capacity + EPSILON {
            bins.push(std::mem::take(&mut current));
            current_length = 0.0;
            current_thickness = effective_thickness(unit.line.thickness, rules);
        } else {
            current_thickness = thickness;
        }
        current_length += length;
        current.push(unit);
    }

    if !current.is_empty() {
        bins.push(current);
    }
    bins
}

/// Bounded search over contiguous partitions of the length-sorted units,
/// minimizing the summed fee reported by `cost`.
///
/// `cost` returns `None` for a box the rate table cannot price; any priced
/// partition beats an unpriced one. Falls back to [`combine_greedy`] past the
/// unit or node caps.
pub fn combine_fee_optimal<F>(
    mut units: Vec<PackUnit>,
    rules: &PackagingRules,
    cost: F,
) -> Vec<Vec<PackUnit>>
where
    F: Fn(&[PackUnit]) -> Option<u64>,
{
    let limits = rules.search;
    if units.is_empty() {
        return Vec::new();
    }
    if units.len() > limits.roll_max_units {
        debug!(units = units.len(), "Too many roll units for fee search, packing greedily");
        return combine_greedy(units, rules);
    }

    let thickness = units
        .iter()
        .map(|u| effective_thickness(u.line.thickness, rules))
        .max()
        .unwrap_or(rules.fallback_thickness);
    let capacity = rules.thresholds_for(thickness).large;
    let total: f64 = units.iter().map(PackUnit::total_length).sum();
    if total <= capacity + EPSILON {
        return vec![units];
    }

    units.sort_by(|a, b| {
        b.total_length()
            .partial_cmp(&a.total_length())
            .unwrap_or(Ordering::Equal)
    });

    let min_boxes = ((total / capacity).ceil() as usize).max(1);
    let max_boxes = (min_boxes + limits.roll_box_slack).min(units.len());

    let mut search = PartitionSearch {
        units: &units,
        capacity,
        cost: &cost,
        costs: HashMap::new(),
        max_nodes: limits.max_nodes,
        nodes: 0,
        best: None,
    };

    for boxes in min_boxes..=max_boxes {
        let mut ends = Vec::with_capacity(boxes);
        search.visit(0, boxes, &mut ends);
        if search.best.is_some() && boxes > min_boxes + 1 {
            break;
        }
    }

    let Some((fee, ends)) = search.best else {
        debug!(nodes = search.nodes, "No roll partition found, packing greedily");
        return combine_greedy(units, rules);
    };
    debug!(boxes = ends.len(), ?fee, nodes = search.nodes, "Fee-optimal roll partition");

    let mut bins = Vec::with_capacity(ends.len());
    let mut rest = units;
    let mut start = 0;
    for end in ends {
        let tail = rest.split_off(end - start);
        bins.push(rest);
        rest = tail;
        start = end;
    }
    bins
}

/// Partition cost: priced partitions order before unpriced ones.
type Score = Option<u64>;

fn better(candidate: Score, best: Score) -> bool {
    match (candidate, best) {
        (Some(c), Some(b)) => c < b,
        (Some(_), None) => true,
        _ => false,
    }
}

struct PartitionSearch<'a, F> {
    units: &'a [PackUnit],
    capacity: f64,
    cost: &'a F,
    /// Cost of units[start..end], cached
    costs: HashMap<(usize, usize), Option<u64>>,
    max_nodes: usize,
    nodes: usize,
    best: Option<(Score, Vec<usize>)>,
}

impl<F> PartitionSearch<'_, F>
where
    F: Fn(&[PackUnit]) -> Option<u64>,
{
    /// Extends `ends` with exactly `boxes` more box boundaries starting at `start`.
    fn visit(&mut self, start: usize, boxes: usize, ends: &mut Vec<usize>) {
        if self.nodes >= self.max_nodes {
            return;
        }
        self.nodes += 1;

        let n = self.units.len();
        if boxes == 0 {
            if start == n {
                self.evaluate(ends);
            }
            return;
        }
        // Each remaining box needs at least one unit
        if n - start < boxes {
            return;
        }

        let mut length = 0.0;
        for end in start + 1..=n - (boxes - 1) {
            length += self.units[end - 1].total_length();
            if length > self.capacity + EPSILON {
                break;
            }
            ends.push(end);
            self.visit(end, boxes - 1, ends);
            ends.pop();
        }
    }

    fn evaluate(&mut self, ends: &[usize]) {
        let mut total: Score = Some(0);
        let mut start = 0;
        for &end in ends {
            let units = self.units;
            let cost = self.cost;
            let box_cost = *self
                .costs
                .entry((start, end))
                .or_insert_with(|| cost(&units[start..end]));
            total = match (total, box_cost) {
                (Some(t), Some(c)) => Some(t + c),
                _ => None,
            };
            start = end;
        }

        let replace = match &self.best {
            None => true,
            Some((best, _)) => better(total, *best),
        };
        if replace {
            self.best = Some((total, ends.to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DesignCode, LineClass, OrderLine};
    use std::sync::Arc;

    fn unit(thickness: u32, length_m: f64) -> PackUnit {
        PackUnit {
            line: Arc::new(OrderLine {
                thickness,
                width_cm: 110,
                quantity: 1,
                ..Default::default()
            }),
            class: LineClass::RollMat,
            quantity: 1,
            length_m,
            design_code: DesignCode::Unregistered,
            warnings: Vec::new(),
        }
    }

    fn lengths(bins: &[Vec<PackUnit>]) -> Vec<Vec<f64>> {
        bins.iter()
            .map(|bin| bin.iter().map(|u| u.length_m).collect())
            .collect()
    }

    #[test]
    fn test_greedy_capacity_follows_thickest_unit() {
        let rules = PackagingRules::default();
        // 6T holds 15m, but once a 22T unit joins the box the cap drops to 4.5m
        let bins = combine_greedy(vec![unit(6, 3.0), unit(6, 3.0), unit(22, 1.0)], &rules);
        assert_eq!(lengths(&bins), vec![vec![3.0, 3.0], vec![1.0]]);
    }

    #[test]
    fn test_greedy_unknown_thickness_uses_fallback() {
        let rules = PackagingRules::default();
        let bins = combine_greedy(vec![unit(0, 3.0), unit(0, 3.0), unit(0, 1.0)], &rules);
        assert_eq!(lengths(&bins), vec![vec![3.0, 3.0], vec![1.0]]);
    }

    #[test]
    fn test_fee_optimal_single_box_when_everything_fits() {
        let rules = PackagingRules::default();
        let bins = combine_fee_optimal(vec![unit(12, 2.0), unit(12, 3.0)], &rules, |_| Some(1));
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].len(), 2);
    }

    #[test]
    fn test_fee_optimal_prefers_cheaper_partition() {
        let rules = PackagingRules::default();
        let cost = |bin: &[PackUnit]| {
            let total: f64 = bin.iter().map(PackUnit::total_length).sum();
            Some(if total <= 3.5 { 1000 } else { 10_000 })
        };
        let units = vec![unit(12, 2.0), unit(12, 3.0), unit(12, 2.0), unit(12, 3.0)];
        let bins = combine_fee_optimal(units, &rules, cost);
        assert_eq!(lengths(&bins), vec![vec![3.0], vec![3.0], vec![2.0], vec![2.0]]);
    }

    #[test]
    fn test_fee_optimal_unpriced_keeps_capacity() {
        let rules = PackagingRules::default();
        let units = vec![unit(12, 3.0), unit(12, 3.0), unit(12, 2.0), unit(12, 2.0)];
        let bins = combine_fee_optimal(units, &rules, |_| None);
        assert_eq!(bins.len(), 2);
        for bin in &bins {
            let total: f64 = bin.iter().map(PackUnit::total_length).sum();
            assert!(total <= 8.0);
        }
    }

    #[test]
    fn test_fee_optimal_falls_back_past_unit_cap() {
        let mut rules = PackagingRules::default();
        rules.search.roll_max_units = 2;
        let units = vec![unit(12, 3.0), unit(12, 3.0), unit(12, 3.0)];
        let bins = combine_fee_optimal(units, &rules, |_| Some(1));
        assert_eq!(lengths(&bins), vec![vec![3.0, 3.0], vec![3.0]]);
    }
}
