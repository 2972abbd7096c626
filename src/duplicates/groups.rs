//! Exact duplicate grouping and original selection.
//!
//! # Overview
//!
//! Two files are duplicates when both their normalized name and their
//! content digest match. Every group has at least two members, exactly one
//! of which is the [`Role::Original`]. The original is the member whose
//! parent directory was created first; ties fall back to the shortest path
//! and then to lexicographic path order, so classification of an unchanged
//! file set always picks the same original.
//!
//! # Example
//!
//! ```
//! use dupeguard::duplicates::{classify, NamePolicy, Role};
//! use dupeguard::scanner::{FileRecord, HashedFile};
//! use std::path::PathBuf;
//! use std::time::{Duration, SystemTime};
//!
//! let day = |n: u64| SystemTime::UNIX_EPOCH + Duration::from_secs(86_400 * n);
//! let hashed = |path: &str, created: SystemTime| HashedFile {
//!     record: FileRecord::new(PathBuf::from(path), 3, created),
//!     digest: [7u8; 32],
//!     fingerprint: None,
//! };
//!
//! let files = vec![hashed("/B/doc.txt", day(2)), hashed("/A/doc.txt", day(1))];
//! let groups = classify(&files, NamePolicy::default());
//!
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].original().record.path, PathBuf::from("/A/doc.txt"));
//! assert_eq!(groups[0].members[1].role, Role::Copy);
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::scanner::{hash_to_hex, FileRecord, Hash, HashedFile};

/// How file names are compared when forming group keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamePolicy {
    /// Compare names case-sensitively. Off by default.
    pub case_sensitive: bool,
}

impl NamePolicy {
    /// Case-sensitive policy.
    #[must_use]
    pub fn case_sensitive() -> Self {
        Self {
            case_sensitive: true,
        }
    }

    /// Normalize a name to its grouping key: NFC, lowercased unless
    /// case-sensitive.
    #[must_use]
    pub fn normalize(&self, name: &str) -> String {
        let composed: String = name.nfc().collect();
        if self.case_sensitive {
            composed
        } else {
            composed.to_lowercase()
        }
    }
}

/// Role of a member within an exact duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The retained member
    Original,
    /// Eligible for quarantine
    Copy,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original => write!(f, "original"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// A file in a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    /// The file
    pub record: FileRecord,
    /// Its role in the group
    pub role: Role,
}

/// Files sharing an identical (normalized name, digest) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Normalized file name shared by all members
    pub name_key: String,
    /// Content digest shared by all members
    pub digest: Hash,
    /// Size of each member in bytes
    pub size: u64,
    /// Members; the original comes first, copies follow in keep order
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    /// The retained member.
    #[must_use]
    pub fn original(&self) -> &GroupMember {
        // Construction guarantees a non-empty group with the original first.
        &self.members[0]
    }

    /// Members flagged as copies.
    pub fn copies(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| m.role == Role::Copy)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false for groups produced by [`classify`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Digest as hexadecimal.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hash_to_hex(&self.digest)
    }

    /// Bytes held by the copies.
    #[must_use]
    pub fn copies_size(&self) -> u64 {
        self.copies().map(|m| m.record.size).sum()
    }
}

/// Order in which members are preferred as the original.
///
/// Earliest parent-directory creation, then shortest path, then path order.
#[must_use]
pub fn keep_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    a.dir_created
        .cmp(&b.dir_created)
        .then_with(|| path_len(&a.path).cmp(&path_len(&b.path)))
        .then_with(|| a.path.cmp(&b.path))
}

fn path_len(path: &Path) -> usize {
    path.as_os_str().len()
}

/// Partition hashed files into exact duplicate groups.
///
/// Singletons are dropped. A path appearing more than once in the input is
/// counted once. Groups are ordered by their original's path.
#[must_use]
pub fn classify(files: &[HashedFile], policy: NamePolicy) -> Vec<DuplicateGroup> {
    let mut buckets: BTreeMap<(String, Hash), Vec<&FileRecord>> = BTreeMap::new();
    let mut seen = HashSet::new();

    for file in files {
        if !seen.insert(file.record.path.as_path()) {
            log::debug!("Ignoring repeated path: {}", file.record.path.display());
            continue;
        }
        let key = (policy.normalize(&file.record.name), file.digest);
        buckets.entry(key).or_default().push(&file.record);
    }

    let mut groups: Vec<DuplicateGroup> = buckets
        .into_iter()
        .filter(|(_, records)| records.len() >= 2)
        .map(|((name_key, digest), mut records)| {
            records.sort_by(|a, b| keep_order(a, b));
            let size = records[0].size;
            let members = records
                .into_iter()
                .enumerate()
                .map(|(i, record)| GroupMember {
                    record: record.clone(),
                    role: if i == 0 { Role::Original } else { Role::Copy },
                })
                .collect();
            DuplicateGroup {
                name_key,
                digest,
                size,
                members,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        a.original()
            .record
            .path
            .cmp(&b.original().record.path)
            .then_with(|| a.digest.cmp(&b.digest))
    });

    log::debug!("Classified {} duplicate groups", groups.len());
    groups
}

/// Total bytes held by copies across all groups, each path counted once.
#[must_use]
pub fn total_duplicate_size<'a>(groups: impl IntoIterator<Item = &'a DuplicateGroup>) -> u64 {
    let mut counted = HashSet::new();
    groups
        .into_iter()
        .flat_map(DuplicateGroup::copies)
        .filter(|m| counted.insert(m.record.path.clone()))
        .map(|m| m.record.size)
        .sum()
}
