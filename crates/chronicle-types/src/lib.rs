// crates/chronicle-types/src/lib.rs

//! Shared data contracts between the Chronicle native server and its clients.
//!
//! This crate provides the core domain model for:
//! - **Items**: archived chats and notes with embeddings and salience state
//! - **Facts**: bitemporal `(subject, predicate, object)` triples
//! - **Links**: manual edges between items
//! - **Decay telemetry**: per-run metrics and service-level counters
//!
//! These types are designed to work across native and WASM builds,
//! with no native-only dependencies allowed.

use serde::{Deserialize, Serialize};

// ===================================================
// DOMAIN TYPES
// ===================================================

/// What kind of archived item this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Chat,
    Note,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Chat => "chat",
            ItemKind::Note => "note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(ItemKind::Chat),
            "note" => Some(ItemKind::Note),
            _ => None,
        }
    }
}

/// Memory classification driving decay parameters.
///
/// `Default` is used when an item has never been classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Procedural,
    Emotional,
    #[default]
    Default,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Emotional => "emotional",
            MemoryType::Default => "default",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "episodic" => Some(MemoryType::Episodic),
            "semantic" => Some(MemoryType::Semantic),
            "procedural" => Some(MemoryType::Procedural),
            "emotional" => Some(MemoryType::Emotional),
            "default" => Some(MemoryType::Default),
            _ => None,
        }
    }
}

/// An archived conversation or note.
///
/// `created_at`, `updated_at`, and `last_accessed_at` are millisecond Unix
/// timestamps. `embedding` is a fixed-dimension vector; the dimension is
/// consistent within a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub summary: String,
    pub content: String,
    /// Ordered set: duplicates collapsed, first occurrence wins.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Origin label. A small set is privileged (ChatGPT, Claude, Gemini,
    /// Qwen, LocalLLM, Other, Manual) but any label is accepted.
    pub source: String,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Opaque blob references attached at import time.
    #[serde(default)]
    pub assets: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub memory_type: Option<MemoryType>,
    /// Memory strength in [0, 1].
    pub salience: f64,
    pub recall_count: i64,
    pub last_accessed_at: i64,
    #[serde(default)]
    pub decay_metadata: Option<DecayMetadata>,
}

/// Per-item decay bookkeeping, persisted as a JSON column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayMetadata {
    /// Millisecond timestamp of the last decay pass that touched this row.
    #[serde(default)]
    pub last_decay_run: Option<i64>,
    /// Bounded FIFO of the most recent decay applications (at most 10).
    #[serde(default)]
    pub history: Vec<DecayHistoryEntry>,
}

/// One decay application, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayHistoryEntry {
    pub timestamp: i64,
    pub previous_salience: f64,
    pub new_salience: f64,
    pub hours_since_access: f64,
    pub ltp_factor: f64,
    pub recall_boost: f64,
    pub env_multiplier: f64,
    pub ebbinghaus_modifier: f64,
}

/// A bitemporal fact extracted from an item.
///
/// A fact is *live* while `valid_to` is `None`. Writing a new fact for an
/// existing `(subject, predicate)` closes the prior one instead of deleting
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub chat_id: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub salience: f64,
    pub valid_from: i64,
    #[serde(default)]
    pub valid_to: Option<i64>,
    pub created_at: i64,
    pub recall_count: i64,
    pub last_accessed_at: i64,
    #[serde(default)]
    pub decay_metadata: Option<DecayMetadata>,
}

/// A fact as produced by an extraction collaborator, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
}

/// A manual edge between two items. Logically undirected: `(a, b)` equals
/// `(b, a)` for removal, but one direction is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub from_id: String,
    pub to_id: String,
    #[serde(default, rename = "type")]
    pub link_type: Option<String>,
    pub created_at: i64,
}

// ===================================================
// DECAY TELEMETRY
// ===================================================

/// Append-only record of one decay cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayRunMetric {
    pub run_timestamp: i64,
    pub items_processed: i64,
    pub items_decayed: i64,
    pub error_count: i64,
    pub average_decay_amount: f64,
    pub memory_entropy: f64,
    pub environmental_context: String,
    pub processing_duration_ms: i64,
}

/// Result of a single decay cycle, returned by manual invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub processed: u64,
    pub decayed: u64,
    pub entropy: f64,
    pub duration_ms: u64,
    pub batches: u64,
    pub errors: Vec<String>,
}

/// In-memory counters for the decay service since process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub cycles_run: u64,
    pub total_processed: u64,
    pub total_decayed: u64,
    pub last_run_timestamp: Option<i64>,
    pub last_run_duration_ms: Option<u64>,
    /// Ring buffer of the most recent entropy samples (at most 100).
    pub entropy_samples: Vec<f64>,
}
