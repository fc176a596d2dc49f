use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A field-keyed source row, exactly as the upstream file reader produced it.
pub type RawRecord = BTreeMap<String, String>;

/// Opaque link from a derived object back to the row it came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Zero-based row index in the upload
    pub row: usize,
    pub record: Arc<RawRecord>,
}

impl Provenance {
    pub fn new(row: usize, record: RawRecord) -> Self {
        Self {
            row,
            record: Arc::new(record),
        }
    }

    /// Looks up a raw field, treating blank values as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.record
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Grouping identity of a recipient
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipientKey {
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// Where a line ships to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub address: String,
    pub phone: String,
    #[serde(default)]
    pub zip_code: String,
}

impl Recipient {
    pub fn key(&self) -> RecipientKey {
        RecipientKey {
            name: self.name.clone(),
            address: self.address.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Catalog category of a product, as assigned by the product mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductCategory {
    BabyRoll,
    /// Roll mat sold in fixed 0.5 m sub-units
    PetRoll,
    Roll,
    PeRoll,
    Puzzle,
    Tpu,
    Wallpaper,
    Tape,
    #[default]
    Other,
}

impl ProductCategory {
    pub fn is_roll(self) -> bool {
        matches!(
            self,
            ProductCategory::BabyRoll
                | ProductCategory::PetRoll
                | ProductCategory::Roll
                | ProductCategory::PeRoll
        )
    }

    pub fn is_puzzle(self) -> bool {
        self == ProductCategory::Puzzle
    }

    /// Rate-table product group billed for this category, if any.
    pub fn fee_group(self) -> Option<ProductGroup> {
        match self {
            ProductCategory::BabyRoll | ProductCategory::PetRoll | ProductCategory::Roll => {
                Some(ProductGroup::PvcRollMat)
            }
            ProductCategory::PeRoll => Some(ProductGroup::PeRollMat),
            ProductCategory::Puzzle => Some(ProductGroup::PuzzleMat),
            ProductCategory::Tpu => Some(ProductGroup::TpuMat),
            ProductCategory::Wallpaper => Some(ProductGroup::InsulatingWallpaper),
            ProductCategory::Tape | ProductCategory::Other => None,
        }
    }
}

/// One purchased product line.
///
/// Dimensions follow the seller's conventions: `thickness` is a code in
/// tenths of a centimetre (17 = 1.7 cm), `width_cm` is the roll width and
/// `length_m` the declared length of one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_id: String,
    #[serde(default)]
    pub order_id: String,
    pub recipient: Recipient,
    pub product_id: String,
    pub product_name: String,
    #[serde(default)]
    pub option_text: String,
    #[serde(default)]
    pub category: ProductCategory,
    #[serde(default)]
    pub design: String,
    pub quantity: u32,
    #[serde(default)]
    pub thickness: u32,
    #[serde(default)]
    pub width_cm: u32,
    #[serde(default)]
    pub length_m: f64,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub delivery_memo: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub has_cutting_request: bool,
    #[serde(default)]
    pub has_finishing_request: bool,
    #[serde(default)]
    pub provenance: Provenance,
}

impl OrderLine {
    pub fn thickness_cm(&self) -> f64 {
        f64::from(self.thickness) / 10.0
    }

    /// Product name and option text joined, lowercased, for keyword checks.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.product_name, self.option_text).to_lowercase()
    }

    pub fn memo(&self) -> Option<&str> {
        let memo = self.delivery_memo.trim();
        (!memo.is_empty()).then_some(memo)
    }
}

/// Line classification inside a recipient group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineClass {
    RollMat,
    PuzzleMat,
    Tape,
    Other,
}

/// Non-fatal findings surfaced to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Warning {
    /// Memo segments do not add up to the ordered length
    LengthMismatch { requested_m: f64, ordered_m: f64 },
    /// Memo mentions several lengths without a parseable segment list
    AmbiguousLengths { lengths_m: Vec<f64> },
    /// Group carries a cutting request that needs a manual look
    CuttingRequest { memos: Vec<String> },
    /// Split directive would cut pieces shorter than the smallest allowed roll
    SplitTooFine { piece_m: f64, min_piece_m: f64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::LengthMismatch {
                requested_m,
                ordered_m,
            } => write!(
                f,
                "Requested cut lengths total {}m but {}m was ordered",
                format_meters(*requested_m),
                format_meters(*ordered_m)
            ),
            Warning::AmbiguousLengths { lengths_m } => {
                let listed: Vec<String> = lengths_m
                    .iter()
                    .map(|l| format!("{}m", format_meters(*l)))
                    .collect();
                write!(
                    f,
                    "Memo mentions several lengths ({}); automatic split is unreliable",
                    listed.join(", ")
                )
            }
            Warning::CuttingRequest { memos } => write!(f, "Check: {}", memos.join(" / ")),
            Warning::SplitTooFine {
                piece_m,
                min_piece_m,
            } => write!(
                f,
                "Cut pieces of {}m are shorter than {}m; line left uncut",
                format_meters(*piece_m),
                format_meters(*min_piece_m)
            ),
        }
    }
}

/// Packaging tier of a box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PackagingTier {
    SmallBox,
    LargeBox,
    Wrap,
}

/// Courier a box is handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Courier {
    /// Freight carrier for large boxes and wrapped rolls
    CourierA,
    /// Parcel carrier for small boxes
    CourierB,
}

impl fmt::Display for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Courier::CourierA => write!(f, "courierA"),
            Courier::CourierB => write!(f, "courierB"),
        }
    }
}

/// Printable design code from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DesignCode {
    Registered(String),
    Unregistered,
}

impl DesignCode {
    pub const UNREGISTERED_MARKER: &'static str = "[미등록]";

    pub fn is_registered(&self) -> bool {
        matches!(self, DesignCode::Registered(_))
    }
}

impl fmt::Display for DesignCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesignCode::Registered(code) => f.write_str(code),
            DesignCode::Unregistered => f.write_str(Self::UNREGISTERED_MARKER),
        }
    }
}

/// Product group column of the rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductGroup {
    #[serde(alias = "PVC롤매트")]
    PvcRollMat,
    #[serde(alias = "PE롤매트")]
    PeRollMat,
    #[serde(alias = "퍼즐매트")]
    PuzzleMat,
    #[serde(alias = "TPU매트")]
    TpuMat,
    #[serde(alias = "단열벽지")]
    InsulatingWallpaper,
}

/// One row of the shipping-fee rate table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingFeeRule {
    #[serde(default, alias = "순번")]
    pub seq: u32,
    #[serde(alias = "제품군")]
    pub product_group: ProductGroup,
    #[serde(default, alias = "포장종류")]
    pub packaging_type: String,
    #[serde(alias = "배송비")]
    pub fee: u64,
    /// Width in cm
    #[serde(default, alias = "폭(cm)")]
    pub width: Option<f64>,
    /// Thickness in cm
    #[serde(default, alias = "두께(cm)")]
    pub thickness: Option<f64>,
    #[serde(default, alias = "길이_최소(m)")]
    pub length_min: Option<f64>,
    #[serde(default, alias = "길이_최대(m)")]
    pub length_max: Option<f64>,
}

/// One row of the design/catalog table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: String,
    pub option_text: String,
    pub design_code: String,
    /// Declared length of one sold unit, in metres
    #[serde(default)]
    pub length_m: Option<f64>,
}

/// Promotional entitlement attached to a recipient's first box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftAward {
    /// Rule set that granted the award
    pub source: String,
    pub text: String,
}

/// Error type for engine construction and reference loading
#[derive(Debug, thiserror::Error)]
pub enum PackingError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid reference data: {0}")]
    InvalidReference(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid {format} in {origin}: {message}")]
    Parse {
        origin: String,
        format: crate::loader::DocumentFormat,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, PackingError>;

/// Formats metres without trailing zeros (`2.50` → `2.5`, `3.0` → `3`).
pub fn format_meters(value: f64) -> String {
    let rounded = round_meters(value);
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let text = format!("{:.3}", rounded);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Rounds a length to millimetres, hiding float noise from repeated sums.
pub fn round_meters(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_meters_trims_zeros() {
        assert_eq!(format_meters(3.0), "3");
        assert_eq!(format_meters(2.5), "2.5");
        assert_eq!(format_meters(0.1 + 0.2), "0.3");
        assert_eq!(format_meters(1.25), "1.25");
    }

    #[test]
    fn test_category_fee_groups() {
        assert_eq!(
            ProductCategory::PetRoll.fee_group(),
            Some(ProductGroup::PvcRollMat)
        );
        assert_eq!(
            ProductCategory::PeRoll.fee_group(),
            Some(ProductGroup::PeRollMat)
        );
        assert_eq!(ProductCategory::Tape.fee_group(), None);
        assert!(ProductCategory::PeRoll.is_roll());
        assert!(!ProductCategory::Puzzle.is_roll());
    }

    #[test]
    fn test_fee_rule_accepts_source_headers() {
        let rule: ShippingFeeRule = serde_json::from_str(
            r#"{"순번": 3, "제품군": "퍼즐매트", "포장종류": "강화비닐(100x100cm)", "배송비": 7000,
                "폭(cm)": 100, "두께(cm)": 2.5, "길이_최소(m)": 1, "길이_최대(m)": 6}"#,
        )
        .unwrap();
        assert_eq!(rule.seq, 3);
        assert_eq!(rule.product_group, ProductGroup::PuzzleMat);
        assert_eq!(rule.fee, 7000);
        assert_eq!(rule.length_max, Some(6.0));
    }

    #[test]
    fn test_unregistered_design_code_display() {
        assert_eq!(DesignCode::Unregistered.to_string(), "[미등록]");
        assert_eq!(DesignCode::Registered("MB".into()).to_string(), "MB");
    }
}
