use std::collections::HashMap;
use tracing::debug;

use crate::config::SearchLimits;

/// Splits `total` pieces into boxes of at most `capacity`, filling boxes in order.
pub fn fill_by_capacity(total: u32, capacity: u32) -> Vec<u32> {
    let capacity = capacity.max(1);
    let mut split = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let qty = remaining.min(capacity);
        split.push(qty);
        remaining -= qty;
    }
    split
}

/// Chooses per-box piece counts for `total` puzzle pieces minimizing the
/// summed fee reported by `cost` for a box of a given count.
///
/// Box counts from `ceil(total / capacity)` up to a small slack are searched
/// exhaustively, except that wide per-box ranges are sampled at their
/// min/mid/max. Large totals and exhausted node budgets fall back to
/// [`fill_by_capacity`]. A count the rate table cannot price (`None`) ranks
/// behind every priced split.
pub fn find_optimal_puzzle_split<F>(
    total: u32,
    capacity: u32,
    limits: &SearchLimits,
    cost: F,
) -> Vec<u32>
where
    F: Fn(u32) -> Option<u64>,
{
    let capacity = capacity.max(1);
    if total == 0 {
        return Vec::new();
    }
    if total <= capacity {
        return vec![total];
    }
    if total > limits.puzzle_max_count {
        debug!(total, "Puzzle count above search cap, filling by capacity");
        return fill_by_capacity(total, capacity);
    }

    let min_boxes = total.div_ceil(capacity);
    let max_boxes = (min_boxes + limits.puzzle_box_slack).min(total);

    let mut search = SplitSearch {
        capacity,
        spread: limits.candidate_spread,
        cost,
        costs: HashMap::new(),
        max_nodes: limits.max_nodes,
        nodes: 0,
        best: None,
    };

    for boxes in min_boxes..=max_boxes {
        let mut split = Vec::with_capacity(boxes as usize);
        search.visit(total, boxes, &mut split);
        if search.best.is_some() && boxes > min_boxes + 2 {
            break;
        }
    }

    match search.best {
        Some((_, split)) => split,
        None => fill_by_capacity(total, capacity),
    }
}

struct SplitSearch<F> {
    capacity: u32,
    spread: u32,
    cost: F,
    costs: HashMap<u32, Option<u64>>,
    max_nodes: usize,
    nodes: usize,
    best: Option<(Option<u64>, Vec<u32>)>,
}

impl<F> SplitSearch<F>
where
    F: Fn(u32) -> Option<u64>,
{
    fn visit(&mut self, remaining: u32, boxes: u32, split: &mut Vec<u32>) {
        if self.nodes >= self.max_nodes {
            return;
        }
        self.nodes += 1;

        if boxes == 0 {
            if remaining == 0 {
                self.evaluate(split);
            }
            return;
        }
        if remaining < boxes {
            return;
        }

        let min_qty = remaining.div_ceil(boxes).max(1);
        let max_qty = self.capacity.min(remaining - (boxes - 1));
        if min_qty > max_qty {
            return;
        }

        let candidates: Vec<u32> = if max_qty - min_qty > self.spread {
            vec![min_qty, (min_qty + max_qty) / 2, max_qty]
        } else {
            (min_qty..=max_qty).collect()
        };

        for qty in candidates {
            split.push(qty);
            self.visit(remaining - qty, boxes - 1, split);
            split.pop();
        }
    }

    fn evaluate(&mut self, split: &[u32]) {
        let mut total = Some(0u64);
        for &count in split {
            let cost = &self.cost;
            let box_cost = *self.costs.entry(count).or_insert_with(|| cost(count));
            total = match (total, box_cost) {
                (Some(t), Some(c)) => Some(t + c),
                _ => None,
            };
        }

        let replace = match &self.best {
            None => true,
            Some((best, _)) => match (total, *best) {
                (Some(t), Some(b)) => t < b,
                (Some(_), None) => true,
                _ => false,
            },
        };
        if replace {
            self.best = Some((total, split.to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiered(count: u32) -> Option<u64> {
        match count {
            1..=4 => Some(5000),
            5..=6 => Some(6000),
            _ => None,
        }
    }

    #[test]
    fn test_fits_in_one_box() {
        let split = find_optimal_puzzle_split(5, 6, &SearchLimits::default(), tiered);
        assert_eq!(split, vec![5]);
    }

    #[test]
    fn test_fourteen_at_capacity_six() {
        let split = find_optimal_puzzle_split(14, 6, &SearchLimits::default(), tiered);
        assert!(split.len() >= 3);
        assert_eq!(split.iter().sum::<u32>(), 14);
        assert!(split.iter().all(|c| *c <= 6));
        assert_eq!(split, vec![6, 4, 4]);
    }

    #[test]
    fn test_unpriced_table_keeps_minimum_boxes() {
        let split = find_optimal_puzzle_split(14, 6, &SearchLimits::default(), |_| None);
        assert_eq!(split, vec![5, 5, 4]);
    }

    #[test]
    fn test_large_counts_fill_by_capacity() {
        let split = find_optimal_puzzle_split(55, 6, &SearchLimits::default(), tiered);
        assert_eq!(split.len(), 10);
        assert_eq!(split[..9], [6; 9]);
        assert_eq!(split[9], 1);
    }

    #[test]
    fn test_wide_ranges_are_sampled() {
        // Only 24 and 16 get the discounted rate
        let discounted = |count: u32| Some(if count == 24 || count == 16 { 100 } else { 1000 });

        // 2 boxes span 20..=30, within the default spread: every count is tried
        let split = find_optimal_puzzle_split(40, 30, &SearchLimits::default(), discounted);
        assert_eq!(split, vec![24, 16]);

        // A narrow spread keeps only 20/25/30 for the first box
        let limits = SearchLimits {
            candidate_spread: 4,
            ..SearchLimits::default()
        };
        let split = find_optimal_puzzle_split(40, 30, &limits, discounted);
        assert_eq!(split.iter().sum::<u32>(), 40);
        assert!(split.len() >= 2);
        assert!(split.iter().all(|c| *c <= 30));
        assert_eq!(split, vec![20, 20]);
    }

    #[test]
    fn test_node_cap_falls_back() {
        let limits = SearchLimits {
            max_nodes: 1,
            ..SearchLimits::default()
        };
        let split = find_optimal_puzzle_split(14, 6, &limits, tiered);
        assert_eq!(split, vec![6, 6, 2]);
    }

    #[test]
    fn test_fill_by_capacity() {
        assert_eq!(fill_by_capacity(14, 4), vec![4, 4, 4, 2]);
        assert!(fill_by_capacity(0, 4).is_empty());
    }
}
