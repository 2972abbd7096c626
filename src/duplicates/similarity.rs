//! Advisory clustering of visually similar media.
//!
//! Fingerprints are indexed in a BK-tree and linked whenever their Hamming
//! distance is within the threshold; linked files are merged with a
//! union-find. Clusters carry no original/copy roles and are never acted on
//! automatically.

use std::collections::BTreeMap;

use bk_tree::{BKTree, Metric};

use crate::scanner::{FileRecord, Fingerprint, HashedFile};

/// A fingerprint tagged with the index of the file it came from.
#[derive(Debug, Clone)]
struct IndexedFingerprint {
    index: usize,
    hash: Fingerprint,
}

/// Hamming distance between fingerprints.
#[derive(Debug, Clone, Copy, Default)]
struct FingerprintMetric;

impl Metric<IndexedFingerprint> for FingerprintMetric {
    fn distance(&self, a: &IndexedFingerprint, b: &IndexedFingerprint) -> u32 {
        a.hash.dist(&b.hash)
    }

    fn threshold_distance(
        &self,
        a: &IndexedFingerprint,
        b: &IndexedFingerprint,
        threshold: u32,
    ) -> Option<u32> {
        let d = self.distance(a, b);
        (d <= threshold).then_some(d)
    }
}

/// Disjoint-set forest over file indices.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Files whose fingerprints are within the distance threshold of each other
/// (directly or through a chain of close neighbours).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityCluster {
    /// Members, sorted by path
    pub members: Vec<FileRecord>,
    /// Largest pairwise link distance that joined the cluster
    pub max_distance: u32,
}

impl SimilarityCluster {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false for clusters produced by [`cluster_similar`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Cluster fingerprinted files by Hamming distance.
///
/// Files without a fingerprint are ignored. Only clusters of two or more
/// files are returned; each file belongs to at most one cluster. Clusters
/// are ordered by their first member's path.
#[must_use]
pub fn cluster_similar(files: &[HashedFile], threshold: u32) -> Vec<SimilarityCluster> {
    let candidates: Vec<(&FileRecord, &Fingerprint)> = files
        .iter()
        .filter_map(|f| f.fingerprint.as_ref().map(|fp| (&f.record, fp)))
        .collect();
    if candidates.len() < 2 {
        return Vec::new();
    }

    let mut tree = BKTree::new(FingerprintMetric);
    let mut sets = UnionFind::new(candidates.len());
    let mut link_distance = vec![0u32; candidates.len()];

    for (index, (_, hash)) in candidates.iter().enumerate() {
        let key = IndexedFingerprint {
            index,
            hash: (*hash).clone(),
        };
        let neighbours: Vec<(u32, usize)> = tree
            .find(&key, threshold)
            .map(|(d, other)| (d, other.index))
            .collect();
        for (distance, other) in neighbours {
            sets.union(index, other);
            link_distance[index] = link_distance[index].max(distance);
            link_distance[other] = link_distance[other].max(distance);
        }
        tree.add(key);
    }

    let mut roots: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..candidates.len() {
        let root = sets.find(index);
        roots.entry(root).or_default().push(index);
    }

    let mut clusters: Vec<SimilarityCluster> = roots
        .into_values()
        .filter(|indices| indices.len() >= 2)
        .map(|indices| {
            let max_distance = indices
                .iter()
                .map(|&i| link_distance[i])
                .max()
                .unwrap_or(0);
            let mut members: Vec<FileRecord> =
                indices.iter().map(|&i| candidates[i].0.clone()).collect();
            members.sort_by(|a, b| a.path.cmp(&b.path));
            SimilarityCluster {
                members,
                max_distance,
            }
        })
        .collect();

    clusters.sort_by(|a, b| a.members[0].path.cmp(&b.members[0].path));
    log::debug!(
        "Found {} similarity clusters (threshold {})",
        clusters.len(),
        threshold
    );
    clusters
}
