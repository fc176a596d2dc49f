use super::PackUnit;
use crate::config::CourierPolicy;
use crate::types::{Courier, PackagingTier};

const FRAGILE_MARK: char = '★';

/// Recipient label for box `ordinal` of `count`: `N-iName`, or the bare name
/// for a single box. Fragile boxes get a trailing star.
pub fn box_label(name: &str, ordinal: usize, count: usize, fragile: bool) -> String {
    let mut label = if count > 1 {
        format!("{}-{}{}", count, ordinal, name)
    } else {
        name.to_string()
    };
    if fragile {
        label.push(FRAGILE_MARK);
    }
    label
}

/// Picks the courier for a finished box.
pub fn assign_courier(
    tier: PackagingTier,
    combined: bool,
    units: &[PackUnit],
    policy: &CourierPolicy,
) -> Courier {
    if tier == PackagingTier::SmallBox {
        return Courier::CourierB;
    }
    match policy {
        CourierPolicy::TierOnly => Courier::CourierA,
        CourierPolicy::TierWithWidthOverride { width_cm } => match units {
            [single] if !combined && single.line.width_cm == *width_cm => Courier::CourierB,
            _ => Courier::CourierA,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DesignCode, LineClass, OrderLine};
    use std::sync::Arc;

    fn unit(width_cm: u32) -> PackUnit {
        PackUnit {
            line: Arc::new(OrderLine {
                width_cm,
                quantity: 1,
                ..Default::default()
            }),
            class: LineClass::RollMat,
            quantity: 1,
            length_m: 10.0,
            design_code: DesignCode::Unregistered,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(box_label("홍길동", 1, 1, false), "홍길동");
        assert_eq!(box_label("홍길동", 2, 3, false), "3-2홍길동");
        assert_eq!(box_label("홍길동", 1, 1, true), "홍길동★");
        assert_eq!(box_label("홍길동", 3, 3, true), "3-3홍길동★");
    }

    #[test]
    fn test_small_box_goes_to_courier_b() {
        let policy = CourierPolicy::default();
        assert_eq!(
            assign_courier(PackagingTier::SmallBox, true, &[unit(110)], &policy),
            Courier::CourierB
        );
    }

    #[test]
    fn test_width_override_for_single_uncombined_unit() {
        let policy = CourierPolicy::TierWithWidthOverride { width_cm: 70 };
        assert_eq!(
            assign_courier(PackagingTier::Wrap, false, &[unit(70)], &policy),
            Courier::CourierB
        );
        assert_eq!(
            assign_courier(PackagingTier::Wrap, true, &[unit(70)], &policy),
            Courier::CourierA
        );
        assert_eq!(
            assign_courier(PackagingTier::LargeBox, false, &[unit(70), unit(70)], &policy),
            Courier::CourierA
        );
        assert_eq!(
            assign_courier(PackagingTier::LargeBox, false, &[unit(110)], &policy),
            Courier::CourierA
        );
    }

    #[test]
    fn test_tier_only_policy_ignores_width() {
        assert_eq!(
            assign_courier(PackagingTier::Wrap, false, &[unit(70)], &CourierPolicy::TierOnly),
            Courier::CourierA
        );
    }
}
