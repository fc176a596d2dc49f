//! Conversion of field-keyed export rows into [`OrderLine`]s.
//!
//! Splitting the uploaded file into records happens upstream; this module
//! only reads named fields, extracts product attributes from free text and
//! drops rows that lack the minimum required fields.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::warn;

use crate::config::EngineConfig;
use crate::types::{OrderLine, ProductCategory, Provenance, RawRecord, Recipient};

static ZIP_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d{5})\)").unwrap());

static DESIGN_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"디자인(?:선택)?:\s*([^/]+)").unwrap());
static COLOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"색상:\s*([^/]+)").unwrap());

static THICKNESS_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)두께선택:\s*([0-9.]+)(T)").unwrap());
static THICKNESS_WIDTH_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)두께\s*(?:\(?폭\)?|/?\s*폭)?:\s*([0-9.]+)(mm|cm|T)").unwrap());
static THICKNESS_PAREN_CM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(([0-9.]+)\s*(cm)\)").unwrap());

static THICKNESS_WIDTH_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"두께\s*/?\s*폭:\s*[0-9.]+cm/([0-9]+)cm").unwrap());
static WIDTH_PAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(폭([0-9]+)cm\)").unwrap());

static LENGTH_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"길이선택:\s*(\d+)x(\d+)").unwrap());
static LENGTH_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)길이(?:\(수량추가\))?:\s*([0-9.]+)\s*(cm|m|미터|메터)").unwrap()
});
static LENGTH_METERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+(?:\.[0-9]+)?)\s*(?:m|미터|메터)").unwrap());
static LENGTH_LONG_CM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]{3,})\s*cm").unwrap());

static PUZZLE_SPEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([0-9]+)mm\)\s*([0-9]+)x([0-9]+)\s*\d+장").unwrap());

static NAME_THICKNESS_T: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)T(?:[^a-z]|$)").unwrap());
static NAME_THICKNESS_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"x(\d+\.\d+)").unwrap());
static NAME_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)x(\d+)cm").unwrap());

static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

/// Design names printed in product titles
const KNOWN_DESIGNS: &[&str] = &[
    "마블아이보리",
    "퓨어아이보리",
    "그레이캔버스",
    "딜라이트우드",
    "모던그레이",
    "스노우화이트",
    "내추럴우드",
    "바닐라아이보리",
    "라이트그레이",
    "스카이블루",
    "파스텔핑크",
    "무직타이거",
    "코지베어",
    "플라워가든",
    "스타라이트",
    "헬로베어",
    "트로피칼",
    "사파리",
    "포레스트",
    "클라우드",
];

/// Attributes recovered from option text or a product title
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductAttributes {
    pub design: Option<String>,
    /// Thickness code (tenths of a centimetre)
    pub thickness: Option<u32>,
    pub width_cm: Option<u32>,
    pub length_m: Option<f64>,
}

impl ProductAttributes {
    /// Fills gaps in `self` from `other`.
    pub fn or(self, other: ProductAttributes) -> ProductAttributes {
        ProductAttributes {
            design: self.design.or(other.design),
            thickness: self.thickness.or(other.thickness),
            width_cm: self.width_cm.or(other.width_cm),
            length_m: self.length_m.or(other.length_m),
        }
    }
}

/// Converts a thickness value with its unit into a thickness code.
///
/// `T` and `mm` are already in code units; centimetres are scaled by ten.
pub fn thickness_code(value: f64, unit: &str) -> Option<u32> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let code = match unit.to_ascii_lowercase().as_str() {
        "cm" => (value * 10.0).round(),
        _ => value.round(),
    };
    Some(code as u32)
}

/// Converts a length value with its unit into metres.
pub fn length_to_meters(value: f64, unit: &str) -> Option<f64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    match unit.to_lowercase().as_str() {
        "cm" => Some(value / 100.0),
        _ => Some(value),
    }
}

fn capture_f64(caps: &regex::Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx)?.as_str().parse::<f64>().ok()
}

fn capture_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse::<u32>().ok()
}

/// Extracts design, thickness, width and length from marketplace option text.
pub fn parse_option_text(text: &str) -> ProductAttributes {
    let mut attrs = ProductAttributes {
        design: DESIGN_SELECT
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|d| !d.is_empty()),
        ..Default::default()
    };

    attrs.thickness = [&*THICKNESS_SELECT, &*THICKNESS_WIDTH_LABEL, &*THICKNESS_PAREN_CM]
        .iter()
        .find_map(|re| {
            let caps = re.captures(text)?;
            thickness_code(capture_f64(&caps, 1)?, caps.get(2)?.as_str())
        });

    attrs.width_cm = THICKNESS_WIDTH_PAIR
        .captures(text)
        .or_else(|| WIDTH_PAREN.captures(text))
        .and_then(|c| capture_u32(&c, 1));

    if let Some(caps) = LENGTH_SELECT.captures(text) {
        if attrs.width_cm.is_none() {
            attrs.width_cm = capture_u32(&caps, 1);
        }
        attrs.length_m = capture_f64(&caps, 2)
            .filter(|cm| *cm >= 100.0)
            .map(|cm| cm / 100.0);
    }

    if attrs.length_m.is_none() {
        attrs.length_m = LENGTH_LABEL.captures(text).and_then(|c| {
            length_to_meters(capture_f64(&c, 1)?, c.get(2)?.as_str())
        });
    }
    if attrs.length_m.is_none() {
        attrs.length_m = LENGTH_METERS
            .captures(text)
            .and_then(|c| capture_f64(&c, 1))
            .filter(|m| *m > 0.0);
    }
    if attrs.length_m.is_none() {
        // Width markers also end in "cm"
        let without_width = WIDTH_PAREN.replace_all(text, "");
        let without_width = THICKNESS_WIDTH_PAIR.replace_all(&without_width, "");
        attrs.length_m = LENGTH_LONG_CM
            .captures(&without_width)
            .and_then(|c| capture_f64(&c, 1))
            .map(|cm| cm / 100.0);
    }

    if let Some(caps) = PUZZLE_SPEC.captures(text) {
        attrs.thickness = capture_f64(&caps, 1).and_then(|mm| thickness_code(mm, "mm"));
        attrs.width_cm = capture_u32(&caps, 2);
        // Puzzle options describe pieces, not a roll length
        attrs.length_m = None;
    }

    if attrs.design.is_none() {
        attrs.design = COLOR
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|d| !d.is_empty());
    }

    attrs
}

/// Extracts the same attributes from a product title such as `마블아이보리 6T 110x50cm`.
pub fn parse_product_name(name: &str) -> ProductAttributes {
    let mut attrs = ProductAttributes {
        design: KNOWN_DESIGNS
            .iter()
            .find(|d| name.contains(*d))
            .map(|d| d.to_string()),
        ..Default::default()
    };

    attrs.thickness = match NAME_THICKNESS_T.captures(name) {
        Some(caps) => capture_f64(&caps, 1).and_then(|t| thickness_code(t, "T")),
        None => NAME_THICKNESS_DECIMAL
            .captures(name)
            .and_then(|c| thickness_code(capture_f64(&c, 1)?, "cm")),
    };

    if let Some(caps) = NAME_SIZE.captures(name) {
        let width = capture_u32(&caps, 1);
        let length = capture_u32(&caps, 2);
        attrs.width_cm = width;
        if let (Some(w), Some(l)) = (width, length) {
            if l >= 100 || l >= w {
                attrs.length_m = Some(f64::from(l) / 100.0);
            }
        }
    }

    if attrs.length_m.is_none() {
        attrs.length_m = LENGTH_METERS
            .captures(name)
            .and_then(|c| capture_f64(&c, 1))
            .filter(|m| *m > 0.0);
    }

    attrs
}

/// Fallback category from keywords in the product title.
pub fn category_from_name(name: &str) -> ProductCategory {
    if name.contains("퍼즐") {
        ProductCategory::Puzzle
    } else if name.contains("애견") || name.contains("펫") {
        ProductCategory::PetRoll
    } else if name.contains("유아") || name.contains("아기") {
        ProductCategory::BabyRoll
    } else if name.contains("TPU") {
        ProductCategory::Tpu
    } else if name.contains("PE") {
        ProductCategory::PeRoll
    } else if name.contains("벽지") {
        ProductCategory::Wallpaper
    } else if name.contains("테이프") {
        ProductCategory::Tape
    } else {
        ProductCategory::Other
    }
}

/// Pulls a `(NNNNN)` postal code out of an address.
pub fn extract_zip_code(address: &str) -> Option<String> {
    ZIP_CODE.captures(address).map(|c| c[1].to_string())
}

/// Parses an amount such as `₩125,300` into whole currency units.
pub fn parse_price(raw: &str) -> u64 {
    let whole = raw.split('.').next().unwrap_or_default();
    let digits: String = whole.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Parses a quantity, treating absent or non-positive values as one unit.
pub fn parse_quantity(raw: Option<&str>) -> u32 {
    raw.and_then(|q| q.trim().parse::<i64>().ok())
        .filter(|q| *q > 0)
        .map(|q| q.min(i64::from(u32::MAX)) as u32)
        .unwrap_or(1)
}

fn field<'a>(record: &'a RawRecord, name: &str) -> Option<&'a str> {
    record
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Builds an [`OrderLine`] from one export row.
///
/// Returns `None` when the line id or product name is missing; such rows
/// contribute nothing downstream.
pub fn parse_record(row: usize, record: &RawRecord, config: &EngineConfig) -> Option<OrderLine> {
    let names = &config.fields;
    let products = &config.products;

    let (Some(line_id), Some(product_name)) = (
        field(record, &names.line_id),
        field(record, &names.product_name),
    ) else {
        warn!(row, "Dropping record without line id or product name");
        return None;
    };

    let option_text = field(record, &names.option_text).unwrap_or_default();
    let product_id = field(record, &names.product_id).unwrap_or_default();
    let delivery_memo = field(record, &names.delivery_memo).unwrap_or_default();

    let attrs = parse_option_text(option_text).or(parse_product_name(product_name));

    let category = products
        .mapping(product_id)
        .map(|m| m.category)
        .unwrap_or_else(|| category_from_name(product_name));

    let is_subunit = products.is_subunit_roll(product_id, category);
    let memo_lower = delivery_memo.to_lowercase();
    let has_cutting_request = is_subunit
        && (products
            .cutting_keywords
            .iter()
            .any(|k| memo_lower.contains(&k.to_lowercase()))
            || DIGIT.is_match(delivery_memo));
    let has_finishing_request = products.finishing_product_ids.iter().any(|id| id == product_id)
        && products
            .finishing_keywords
            .iter()
            .any(|k| delivery_memo.contains(k.as_str()));

    let address = field(record, &names.address)
        .or_else(|| field(record, &names.fallback_address))
        .unwrap_or_default();
    let zip_code = field(record, &names.zip_code)
        .map(str::to_string)
        .or_else(|| extract_zip_code(address))
        .unwrap_or_default();

    Some(OrderLine {
        line_id: line_id.to_string(),
        order_id: field(record, &names.order_id).unwrap_or_default().to_string(),
        recipient: Recipient {
            name: field(record, &names.recipient_name)
                .or_else(|| field(record, &names.buyer_name))
                .unwrap_or_default()
                .to_string(),
            address: address.to_string(),
            phone: field(record, &names.phone).unwrap_or_default().to_string(),
            zip_code,
        },
        product_id: product_id.to_string(),
        product_name: product_name.to_string(),
        option_text: option_text.to_string(),
        category,
        design: attrs.design.unwrap_or_default(),
        quantity: parse_quantity(field(record, &names.quantity)),
        thickness: attrs.thickness.unwrap_or(0),
        width_cm: attrs.width_cm.unwrap_or(0),
        length_m: attrs.length_m.unwrap_or(0.0),
        price: field(record, &names.line_amount).map(parse_price).unwrap_or(0),
        delivery_memo: delivery_memo.to_string(),
        status: field(record, &names.status).unwrap_or_default().to_string(),
        has_cutting_request,
        has_finishing_request,
        provenance: Provenance::new(row, record.clone()),
    })
}

/// Flattens a JSON or YAML row into a [`RawRecord`]. Numbers and booleans
/// keep their textual form, nulls become blank.
pub fn record_from_values(row: BTreeMap<String, Value>) -> RawRecord {
    row.into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}

/// Parses every record, silently skipping rows that fail the minimum checks.
pub fn parse_records(records: &[RawRecord], config: &EngineConfig) -> Vec<OrderLine> {
    records
        .iter()
        .enumerate()
        .filter_map(|(row, record)| parse_record(row, record, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_option_text_thickness_width_length() {
        let attrs = parse_option_text("디자인선택: 마블아이보리 / 두께/폭: 1.7cm/140cm / 길이: 5m");
        assert_eq!(attrs.design.as_deref(), Some("마블아이보리"));
        assert_eq!(attrs.thickness, Some(17));
        assert_eq!(attrs.width_cm, Some(140));
        assert_eq!(attrs.length_m, Some(5.0));
    }

    #[test]
    fn test_option_text_length_select_in_cm() {
        let attrs = parse_option_text("두께선택: 12T / 길이선택: 110x350");
        assert_eq!(attrs.thickness, Some(12));
        assert_eq!(attrs.width_cm, Some(110));
        assert_eq!(attrs.length_m, Some(3.5));
    }

    #[test]
    fn test_option_text_puzzle_spec() {
        let attrs = parse_option_text("색상: 아이보리 / (25mm) 100x100 6장");
        assert_eq!(attrs.thickness, Some(25));
        assert_eq!(attrs.width_cm, Some(100));
        assert_eq!(attrs.length_m, None);
        assert_eq!(attrs.design.as_deref(), Some("아이보리"));
    }

    #[test]
    fn test_product_name_fallback() {
        let attrs = parse_product_name("마블아이보리 6T 110x50cm");
        assert_eq!(attrs.design.as_deref(), Some("마블아이보리"));
        assert_eq!(attrs.thickness, Some(6));
        assert_eq!(attrs.width_cm, Some(110));
        assert_eq!(attrs.length_m, None);
    }

    #[test]
    fn test_price_and_quantity_parsing() {
        assert_eq!(parse_price("₩125,300"), 125_300);
        assert_eq!(parse_price("23000.00"), 23_000);
        assert_eq!(parse_price(""), 0);
        assert_eq!(parse_quantity(Some("3")), 3);
        assert_eq!(parse_quantity(Some("0")), 1);
        assert_eq!(parse_quantity(None), 1);
    }

    #[test]
    fn test_zip_code_from_address() {
        assert_eq!(
            extract_zip_code("서울시 강남구 (06236) 테헤란로 1").as_deref(),
            Some("06236")
        );
        assert_eq!(extract_zip_code("no zip here"), None);
    }

    #[test]
    fn test_record_missing_required_field_is_dropped() {
        let config = EngineConfig::default();
        let rec = record(&[("상품명", "애견롤매트")]);
        assert!(parse_record(0, &rec, &config).is_none());

        let rec = record(&[("상품주문번호", "L1"), ("상품명", "  ")]);
        assert!(parse_record(1, &rec, &config).is_none());
    }

    #[test]
    fn test_record_maps_fields_and_flags() {
        let config = EngineConfig::default();
        let rec = record(&[
            ("상품주문번호", "L1"),
            ("주문번호", "O1"),
            ("수취인명", "홍길동"),
            ("통합배송지", "서울시 (04524) 중구"),
            ("수취인연락처1", "010-1111-2222"),
            ("상품번호", "4200445704"),
            ("상품명", "애견롤매트"),
            ("옵션정보", "두께선택: 12T / (폭110cm)"),
            ("수량", "10"),
            ("최종 상품별 총 주문금액", "₩50,000"),
            ("배송메세지", "2m 2롤로 재단해주세요"),
        ]);
        let line = parse_record(4, &rec, &config).unwrap();
        assert_eq!(line.line_id, "L1");
        assert_eq!(line.category, ProductCategory::PetRoll);
        assert_eq!(line.recipient.zip_code, "04524");
        assert_eq!(line.quantity, 10);
        assert_eq!(line.thickness, 12);
        assert_eq!(line.width_cm, 110);
        assert_eq!(line.length_m, 0.0);
        assert_eq!(line.price, 50_000);
        assert!(line.has_cutting_request);
        assert!(!line.has_finishing_request);
        assert_eq!(line.provenance.row, 4);
        assert_eq!(line.provenance.field("주문번호"), Some("O1"));
    }

    #[test]
    fn test_record_from_json_values() {
        let row: BTreeMap<String, Value> = serde_json::from_str(
            r#"{"상품주문번호": 2024010112345, "수량": 3, "배송메세지": null, "상품명": "쿠션"}"#,
        )
        .unwrap();
        let rec = record_from_values(row);
        assert_eq!(rec["상품주문번호"], "2024010112345");
        assert_eq!(rec["수량"], "3");
        assert_eq!(rec["배송메세지"], "");
        assert_eq!(rec["상품명"], "쿠션");
    }

    #[test]
    fn test_unmapped_product_uses_name_keywords() {
        assert_eq!(category_from_name("EVA 퍼즐매트"), ProductCategory::Puzzle);
        assert_eq!(category_from_name("실리콘 테이프"), ProductCategory::Tape);
        assert_eq!(category_from_name("쿠션"), ProductCategory::Other);
    }
}
