// crates/camstate-core/src/core/records.rs
// ============================================================================
// Module: camstate Metadata Records
// Description: Categories, tags, recording entries, and migration records.
// Purpose: Typed rows of the relational metadata store.
// Dependencies: crate::core::time, serde, thiserror
// ============================================================================

//! ## Overview
//! These records mirror the relational schema column for column. Categories
//! carry caller-assigned ids; tag and recording ids are assigned by the store.
//! Recordings are tied to tags by timestamp overlap rather than a foreign key,
//! so deleting or re-creating a recording never cascades into tag history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Category identifier, chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(i64);

impl CategoryId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag identifier, assigned by the store in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(i64);

impl TagId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recording identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SECTION: Category
// ============================================================================

/// User-authored classification for tags.
///
/// # Invariants
/// - `name` is unique across categories.
/// - Categories survive factory reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Caller-assigned identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Display color, typically `#RRGGBB`.
    pub color: String,
    /// Creation time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Tag
// ============================================================================

/// Annotation placed on the recording timeline.
///
/// # Invariants
/// - Tags are never physically removed; `deleted` marks them inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Store-assigned identifier.
    pub id: TagId,
    /// Referenced category.
    pub category_id: CategoryId,
    /// Point in time the tag marks.
    pub timestamp: Timestamp,
    /// Optional short title.
    pub title: Option<String>,
    /// Optional free-form note.
    pub note: Option<String>,
    /// Optional author label.
    pub created_by: Option<String>,
    /// Soft-delete flag.
    pub deleted: bool,
}

/// Insert payload for a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTag {
    /// Referenced category.
    pub category_id: CategoryId,
    /// Point in time the tag marks.
    pub timestamp: Timestamp,
    /// Optional short title.
    pub title: Option<String>,
    /// Optional free-form note.
    pub note: Option<String>,
    /// Optional author label.
    pub created_by: Option<String>,
}

impl NewTag {
    /// Builds a tag payload from the annotation fields. Empty strings are kept.
    #[must_use]
    pub fn new(
        category_id: CategoryId,
        timestamp: Timestamp,
        title: impl Into<String>,
        note: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            category_id,
            timestamp,
            title: Some(title.into()),
            note: Some(note.into()),
            created_by: Some(created_by.into()),
        }
    }
}

// ============================================================================
// SECTION: Recording
// ============================================================================

/// Lifecycle state of a recording.
///
/// Transitions follow the chain `ready <-> recording <-> defect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Finalized and playable.
    #[default]
    Ready,
    /// Still being written.
    Recording,
    /// Damaged or incomplete.
    Defect,
}

impl RecordState {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Recording => "recording",
            Self::Defect => "defect",
        }
    }

    /// Returns true when moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::Ready | Self::Recording)
                | (Self::Recording, _)
                | (Self::Defect, Self::Defect | Self::Recording)
        )
    }
}

impl FromStr for RecordState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ready" => Ok(Self::Ready),
            "recording" => Ok(Self::Recording),
            "defect" => Ok(Self::Defect),
            other => Err(format!("unknown recording state: {other}")),
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finalized recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Media file name.
    pub filename: String,
    /// Media type, e.g. `video`.
    pub media_type: Option<String>,
    /// Encoding, e.g. `h264`.
    pub encoding: Option<String>,
    /// Start of the recording.
    pub timestamp_start: Option<Timestamp>,
    /// End of the recording.
    pub timestamp_end: Option<Timestamp>,
    /// Duration in milliseconds.
    pub duration: Option<i64>,
    /// File size in bytes.
    pub size: Option<i64>,
    /// Resolution label, e.g. `1920x1080`.
    pub resolution: Option<String>,
    /// Frames per second.
    pub fps: Option<f64>,
    /// Lifecycle state.
    pub state: RecordState,
    /// Count of active tags inside the time range.
    pub tag_markers: i64,
}

impl RecordingEntry {
    /// Returns true when `timestamp` falls inside the recording range.
    #[must_use]
    pub fn covers(&self, timestamp: Timestamp) -> bool {
        match (self.timestamp_start, self.timestamp_end) {
            (Some(start), Some(end)) => start <= timestamp && timestamp <= end,
            _ => false,
        }
    }
}

/// Insert payload for a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewRecording {
    /// Media file name.
    pub filename: String,
    /// Media type.
    pub media_type: Option<String>,
    /// Encoding.
    pub encoding: Option<String>,
    /// Start of the recording.
    pub timestamp_start: Option<Timestamp>,
    /// End of the recording.
    pub timestamp_end: Option<Timestamp>,
    /// Duration in milliseconds.
    pub duration: Option<i64>,
    /// File size in bytes.
    pub size: Option<i64>,
    /// Resolution label.
    pub resolution: Option<String>,
    /// Frames per second.
    pub fps: Option<f64>,
    /// Initial state.
    pub state: RecordState,
}

// ============================================================================
// SECTION: Migration Record
// ============================================================================

/// Ledger row for an applied schema migration. Append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    /// Migration version.
    pub version: i64,
    /// Time the migration was applied.
    pub applied_at: Timestamp,
}
