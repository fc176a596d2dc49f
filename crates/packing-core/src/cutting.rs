//! Reconciles free-text cutting instructions against ordered sub-unit rolls.
//!
//! Sub-unit roll mats are sold in fixed lengths (0.5 m by default) and the
//! buyer writes the wanted cuts into the delivery memo, e.g. `2m 3롤` or
//! `반으로 잘라주세요`. The normalizer turns quantity × unit length into a
//! list of single-unit roll segments and never fails: the worst case is one
//! unsplit segment with a warning for manual review.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::CuttingRules;
use crate::types::{round_meters, Warning};

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+(?:\.\d+)?)\s*(?:m|미터|메터)\s*(?:씩)?\s*(?:x|×|\*)?\s*(\d+)\s*(?:롤|rolls?)",
    )
    .unwrap()
});

static LENGTH_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:m|미터|메터)").unwrap());

// Digits must touch the keyword: "5678 롤매트" is a phone number, not a roll count
static PIECES_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)롤|(\d+)등분|반씩|반으로").unwrap());

/// An explicit `<length> m × <count> rolls` request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoSegment {
    pub length_m: f64,
    pub count: u32,
}

/// A single split instruction found in a memo
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitDirective {
    /// Divide the total evenly into this many rolls
    Pieces(u32),
    /// Cut rolls of this length, with the remainder as a last roll
    FixedLength(f64),
}

impl SplitDirective {
    /// Length of each full piece when applied to `total_length_m`
    pub fn piece_length(&self, total_length_m: f64) -> f64 {
        match *self {
            SplitDirective::Pieces(pieces) => total_length_m / f64::from(pieces),
            SplitDirective::FixedLength(length) => length,
        }
    }
}

/// Result of normalizing one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutPlan {
    /// Length of each emitted single-unit roll, in order
    pub segments: Vec<f64>,
    pub warnings: Vec<Warning>,
    /// Memo segments matched the ordered length exactly
    pub reconciled: bool,
}

impl CutPlan {
    pub fn total_length(&self) -> f64 {
        round_meters(self.segments.iter().sum())
    }
}

/// Extracts every `<length> m × <count> rolls` segment from a memo.
pub fn parse_segments(memo: &str) -> Vec<MemoSegment> {
    SEGMENT
        .captures_iter(memo)
        .filter_map(|caps| {
            let length_m = caps[1].parse::<f64>().ok()?;
            let count = caps[2].parse::<u32>().ok()?;
            (length_m > 0.0 && count > 0).then_some(MemoSegment { length_m, count })
        })
        .collect()
}

/// Distinct length mentions in a memo; values closer than `tolerance` count once.
pub fn distinct_lengths(memo: &str, tolerance: f64) -> Vec<f64> {
    let mut distinct: Vec<f64> = Vec::new();
    for caps in LENGTH_MENTION.captures_iter(memo) {
        let Ok(value) = caps[1].parse::<f64>() else {
            continue;
        };
        if value > 0.0 && !distinct.iter().any(|d| (d - value).abs() < tolerance) {
            distinct.push(value);
        }
    }
    distinct
}

/// Finds the split directive in a memo.
///
/// A roll-count or half directive takes precedence. A fixed length only
/// counts when it is shorter than the ordered total.
pub fn parse_directive(memo: &str, total_length_m: f64) -> Option<SplitDirective> {
    if let Some(caps) = PIECES_DIRECTIVE.captures(memo) {
        let pieces = match caps.get(1).or_else(|| caps.get(2)) {
            Some(n) => n.as_str().parse::<u32>().unwrap_or(1),
            None => 2,
        };
        return (pieces > 1).then_some(SplitDirective::Pieces(pieces));
    }

    let length = LENGTH_MENTION
        .captures(memo)
        .and_then(|caps| caps[1].parse::<f64>().ok())?;
    (length > 0.0 && length < total_length_m).then_some(SplitDirective::FixedLength(length))
}

/// Splits `quantity × unit_length_m` according to the memo.
///
/// A directive that would cut pieces shorter than `rules.min_piece_m` is
/// not applied; the line stays whole and carries a [`Warning::SplitTooFine`].
pub fn normalize_cutting(
    quantity: u32,
    unit_length_m: f64,
    memo: &str,
    rules: &CuttingRules,
) -> CutPlan {
    let total = round_meters(f64::from(quantity) * unit_length_m);
    let mut warnings = Vec::new();

    let segments = parse_segments(memo);
    if !segments.is_empty() {
        let requested = round_meters(
            segments
                .iter()
                .map(|s| s.length_m * f64::from(s.count))
                .sum(),
        );
        if (requested - total).abs() <= rules.tolerance_m {
            if let Some(short) = segments
                .iter()
                .find(|s| s.length_m + 1e-9 < rules.min_piece_m)
            {
                warnings.push(too_fine(short.length_m, rules));
                return CutPlan {
                    segments: vec![total],
                    warnings,
                    reconciled: false,
                };
            }
            let lengths = segments
                .iter()
                .flat_map(|s| std::iter::repeat(s.length_m).take(s.count as usize))
                .collect();
            debug!(total, pieces = segments.len(), "Memo segments reconciled");
            return CutPlan {
                segments: lengths,
                warnings,
                reconciled: true,
            };
        }
        warn!(requested, ordered = total, "Cut request does not match ordered length");
        warnings.push(Warning::LengthMismatch {
            requested_m: requested,
            ordered_m: total,
        });
    } else {
        let lengths = distinct_lengths(memo, rules.tolerance_m);
        if lengths.len() >= 2 {
            warn!(?lengths, "Memo mentions several lengths");
            warnings.push(Warning::AmbiguousLengths { lengths_m: lengths });
        }
    }

    let lengths = match parse_directive(memo, total) {
        Some(directive) if directive.piece_length(total) + 1e-9 < rules.min_piece_m => {
            warnings.push(too_fine(directive.piece_length(total), rules));
            vec![total]
        }
        Some(SplitDirective::FixedLength(length)) => split_fixed(total, length),
        Some(SplitDirective::Pieces(pieces)) => {
            let each = total / f64::from(pieces);
            vec![each; pieces as usize]
        }
        None => vec![total],
    };

    CutPlan {
        segments: lengths,
        warnings,
        reconciled: false,
    }
}

fn too_fine(piece_m: f64, rules: &CuttingRules) -> Warning {
    let piece_m = round_meters(piece_m);
    warn!(piece_m, min = rules.min_piece_m, "Requested pieces too short, line left uncut");
    Warning::SplitTooFine {
        piece_m,
        min_piece_m: rules.min_piece_m,
    }
}

/// Full pieces of `length` plus the remainder, counted in whole millimetres.
fn split_fixed(total: f64, length: f64) -> Vec<f64> {
    let total_mm = (total * 1000.0).round() as u64;
    let length_mm = (length * 1000.0).round() as u64;
    if length_mm == 0 {
        return vec![total];
    }

    let full = total_mm / length_mm;
    let remainder_mm = total_mm % length_mm;
    let mut lengths = vec![length; full as usize];
    if remainder_mm > 0 {
        lengths.push(remainder_mm as f64 / 1000.0);
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> CuttingRules {
        CuttingRules::default()
    }

    #[test]
    fn test_reconciled_segments() {
        // 10 × 0.5m = 5m, requested 2m×2 + 1m×1
        let plan = normalize_cutting(10, 0.5, "2m 2롤, 1m 1롤로 재단 부탁드려요", &rules());
        assert!(plan.reconciled);
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.segments, vec![2.0, 2.0, 1.0]);
        assert_eq!(plan.total_length(), 5.0);
    }

    #[test]
    fn test_reconciliation_tolerance() {
        let plan = normalize_cutting(5, 0.5, "1.24m씩 2롤", &rules());
        assert!(plan.reconciled);
        assert_eq!(plan.segments.len(), 2);
    }

    #[test]
    fn test_mismatch_warns_and_falls_back_to_directive() {
        // 3m 2롤 = 6m but only 5m ordered; "2롤" then reads as a two-way split
        let plan = normalize_cutting(10, 0.5, "3m 2롤", &rules());
        assert!(!plan.reconciled);
        assert_eq!(
            plan.warnings,
            vec![Warning::LengthMismatch {
                requested_m: 6.0,
                ordered_m: 5.0
            }]
        );
        assert_eq!(plan.segments, vec![2.5, 2.5]);
    }

    #[test]
    fn test_ambiguous_lengths_warn() {
        let plan = normalize_cutting(10, 0.5, "2m랑 3m로 잘라주세요", &rules());
        assert_eq!(
            plan.warnings,
            vec![Warning::AmbiguousLengths {
                lengths_m: vec![2.0, 3.0]
            }]
        );
        // First length mention is a fixed-length split
        assert_eq!(plan.segments, vec![2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_half_directive() {
        let plan = normalize_cutting(8, 0.5, "반으로 잘라주세요", &rules());
        assert_eq!(plan.segments, vec![2.0, 2.0]);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_way_split_directive() {
        let plan = normalize_cutting(9, 0.5, "3등분 해주세요", &rules());
        assert_eq!(plan.segments, vec![1.5, 1.5, 1.5]);
    }

    #[test]
    fn test_fixed_length_longer_than_total_is_ignored() {
        let plan = normalize_cutting(4, 0.5, "5m로 보내주세요", &rules());
        assert_eq!(plan.segments, vec![2.0]);
    }

    #[test]
    fn test_no_memo_yields_single_segment() {
        let plan = normalize_cutting(7, 0.5, "", &rules());
        assert_eq!(plan.segments, vec![3.5]);
        assert!(plan.warnings.is_empty());
        assert!(!plan.reconciled);
    }

    #[test]
    fn test_segment_count_matches_parsed_pairs() {
        let memo = "1m 3롤 / 0.5m 2롤";
        let parsed = parse_segments(memo);
        assert_eq!(
            parsed,
            vec![
                MemoSegment {
                    length_m: 1.0,
                    count: 3
                },
                MemoSegment {
                    length_m: 0.5,
                    count: 2
                },
            ]
        );
        let plan = normalize_cutting(8, 0.5, memo, &rules());
        let expected: u32 = parsed.iter().map(|s| s.count).sum();
        assert_eq!(plan.segments.len() as u32, expected);
    }

    #[test]
    fn test_distinct_lengths_merge_close_values() {
        assert_eq!(distinct_lengths("2m 2.01m 3미터", 0.05), vec![2.0, 3.0]);
    }

    #[test]
    fn test_sub_millimetre_length_leaves_line_uncut() {
        let plan = normalize_cutting(10, 0.5, "0.0004m씩 잘라주세요", &rules());
        assert_eq!(plan.segments, vec![5.0]);
        assert!(matches!(
            plan.warnings.as_slice(),
            [Warning::SplitTooFine { .. }]
        ));
    }

    #[test]
    fn test_fixed_split_remainder_is_exact() {
        // 3.3m in 0.7m pieces
        assert_eq!(split_fixed(3.3, 0.7), vec![0.7, 0.7, 0.7, 0.7, 0.5]);
        assert_eq!(split_fixed(2.0, 0.5), vec![0.5; 4]);
    }

    #[test]
    fn test_phone_number_before_product_word_is_not_a_roll_count() {
        let plan = normalize_cutting(10, 0.5, "010-1234-5678 롤매트 문앞", &rules());
        assert_eq!(plan.segments, vec![5.0]);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_excessive_roll_count_leaves_line_uncut() {
        let plan = normalize_cutting(10, 0.5, "4000000000롤", &rules());
        assert_eq!(plan.segments, vec![5.0]);
        assert_eq!(
            plan.warnings,
            vec![Warning::SplitTooFine {
                piece_m: 0.0,
                min_piece_m: 0.1
            }]
        );

        let plan = normalize_cutting(10, 0.5, "연락처 010-1234-5678롤매트", &rules());
        assert_eq!(plan.segments, vec![5.0]);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_matching_segments_below_min_piece_stay_uncut() {
        // Sums to the ordered 2m but would emit four billion pieces
        let plan = normalize_cutting(4, 0.5, "0.0000000005m 4000000000롤", &rules());
        assert!(!plan.reconciled);
        assert_eq!(plan.segments, vec![2.0]);
        assert!(matches!(
            plan.warnings.as_slice(),
            [Warning::SplitTooFine { .. }]
        ));
    }

    #[test]
    fn test_roll_count_at_min_piece_is_applied() {
        // 5m into 50 pieces of 0.1m sits exactly on the floor
        let plan = normalize_cutting(10, 0.5, "50롤", &rules());
        assert_eq!(plan.segments.len(), 50);
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.total_length(), 5.0);
    }

    #[test]
    fn test_directive_precedence() {
        assert_eq!(parse_directive("2m씩 3롤", 10.0), Some(SplitDirective::Pieces(3)));
        assert_eq!(parse_directive("반씩", 10.0), Some(SplitDirective::Pieces(2)));
        assert_eq!(parse_directive("1롤", 10.0), None);
        assert_eq!(parse_directive("3 롤", 10.0), None);
        assert_eq!(
            parse_directive("2.5m로", 10.0),
            Some(SplitDirective::FixedLength(2.5))
        );
    }
}
