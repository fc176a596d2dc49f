//! Packing and shipping-fee rule engine for roll-mat and puzzle-mat orders.
//!
//! Order lines are grouped by recipient, sub-unit rolls are cut per the
//! buyer's memo, every unit gets a packaging tier, and the units are binned
//! into boxes that are labeled, routed to a courier, priced against the
//! rate table and annotated with gift awards.

pub mod catalog;
pub mod config;
pub mod cutting;
pub mod fee;
pub mod gift;
pub mod grouping;
pub mod ingest;
pub mod loader;
pub mod manifest;
pub mod packer;
pub mod tier;
pub mod types;

pub use catalog::Catalog;
pub use config::EngineConfig;
pub use fee::{resolve_fee, FeeProfile, FeeQuote};
pub use grouping::{group_by_recipient, RecipientGroup};
pub use ingest::{parse_record, parse_records, record_from_values};
pub use loader::{load_file, parse_document, DocumentFormat};
pub use manifest::{build_manifest, ManifestRow};
pub use packer::{
    compute_packing, BoxKind, PackUnit, PackedBox, Packer, PackingResult, PackingSummary,
    ReferenceData,
};
pub use tier::{resolve_tier, TierDecision};
pub use types::*;
