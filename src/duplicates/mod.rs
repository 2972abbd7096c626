//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Exact grouping by (normalized name, content digest)
//! - Deterministic original selection within each group
//! - Advisory clustering of visually similar media
//! - The scan orchestrator tying enumeration, hashing and grouping together

pub mod finder;
pub mod groups;
pub mod similarity;

pub use finder::{
    DuplicateFinder, FinderConfig, FinderError, ScanReport, ScanSummary, ScanWarning, WarningKind,
};
pub use groups::{
    classify, keep_order, total_duplicate_size, DuplicateGroup, GroupMember, NamePolicy, Role,
};
pub use similarity::{cluster_similar, SimilarityCluster};
