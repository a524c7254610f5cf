// crates/camstate-core/src/core/mod.rs
// ============================================================================
// Module: camstate Core Types
// Description: Value model, capabilities, and metadata records.
// Purpose: Group the plain data types shared by every camstate crate.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Plain data types with no runtime behavior beyond conversion and checks.

pub mod capability;
pub mod catalog;
pub mod records;
pub mod time;
pub mod value;

pub use capability::Access;
pub use capability::AccessPolicy;
pub use capability::Caller;
pub use capability::Capability;
pub use capability::CapabilitySet;
pub use capability::ParseCapabilityError;
pub use catalog::CATEGORIES_KEY;
pub use catalog::CATEGORY_COUNTER_KEY;
pub use catalog::DecodedCategories;
pub use catalog::SkippedCategory;
pub use catalog::category_from_value;
pub use catalog::category_to_value;
pub use catalog::decode_categories;
pub use catalog::encode_categories;
pub use catalog::validate_categories;
pub use records::Category;
pub use records::CategoryId;
pub use records::MigrationRecord;
pub use records::NewRecording;
pub use records::NewTag;
pub use records::RecordId;
pub use records::RecordState;
pub use records::RecordingEntry;
pub use records::Tag;
pub use records::TagId;
pub use time::Timestamp;
pub use value::StateValue;
pub use value::ValueError;
pub use value::ValueKind;
