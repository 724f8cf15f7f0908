//! # Identity Merger
//!
//! Collapses raw device identifiers that really belong to one physical
//! device (devices that rotate or perturb their advertised hash) into
//! canonical identities.
//!
//! ## Algorithm
//! 1. Identifiers covered by the static mapping go straight to their mapped
//!    canonical id; identifiers equal to a mapping target map to themselves.
//! 2. All remaining identifiers form the nodes of a similarity graph, with an
//!    edge wherever normalized edit-distance similarity meets the threshold.
//! 3. Canonical identities are the connected components of that graph; each
//!    is represented by its lexicographically smallest member.
//!
//! Pairwise similarity is not transitive, so two identifiers may share a
//! component without being similar to each other. Connected components are
//! the merge rule; a stricter clustering would change results.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_in_range, Result, TrajectoryError};
use crate::union_find::UnionFind;
use crate::Detection;

/// Configuration for identifier merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Minimum normalized edit-distance similarity for two identifiers to be
    /// linked. Must lie in `[0, 1]`. Default: 0.95
    pub similarity_threshold: f64,

    /// Explicit raw → canonical mapping for known device families.
    /// Checked before any similarity computation. A target may only map to
    /// itself. Default: empty
    pub static_mapping: HashMap<String, String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            static_mapping: HashMap::new(),
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_in_range("similarity_threshold", self.similarity_threshold, 0.0, 1.0)?;
        if let Some((raw, _)) = self
            .static_mapping
            .iter()
            .find(|(raw, canonical)| raw.is_empty() || canonical.is_empty())
        {
            return Err(TrajectoryError::config(
                "static_mapping",
                format!("contains an empty identifier (key '{raw}')"),
            ));
        }
        // Targets are canonical ids and must map to themselves, or a re-merge
        // of the output would follow the chain one step further
        if let Some((raw, target, next)) = self.static_mapping.iter().find_map(|(raw, target)| {
            self.static_mapping
                .get(target)
                .filter(|next| *next != target)
                .map(|next| (raw, target, next))
        }) {
            return Err(TrajectoryError::config(
                "static_mapping",
                format!("chains '{raw}' -> '{target}' -> '{next}'; targets must be canonical"),
            ));
        }
        Ok(())
    }
}

/// A merged device identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    /// Representative id used as the grouping key
    pub id: String,
    /// Raw identifiers judged to come from this device, sorted
    pub members: Vec<String>,
}

/// Result of merging: a partition of raw identifiers into canonical identities.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    canonical: HashMap<String, String>,
    identities: Vec<CanonicalIdentity>,
}

impl IdentityMap {
    /// Canonical id for `raw`. Identifiers never seen by the merger are their
    /// own singleton identity.
    pub fn canonical_of<'a>(&'a self, raw: &'a str) -> &'a str {
        self.canonical.get(raw).map(String::as_str).unwrap_or(raw)
    }

    /// All canonical identities, sorted by id.
    pub fn identities(&self) -> &[CanonicalIdentity] {
        &self.identities
    }

    /// Number of canonical identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Partition detections by canonical identity.
    ///
    /// Each group is sorted chronologically, ties broken by sequence number.
    pub fn group_detections(&self, detections: &[Detection]) -> BTreeMap<String, Vec<Detection>> {
        let mut groups: BTreeMap<String, Vec<Detection>> = BTreeMap::new();
        for detection in detections {
            let canonical = self.canonical_of(&detection.raw_identifier);
            groups
                .entry(canonical.to_string())
                .or_default()
                .push(detection.clone());
        }
        for group in groups.values_mut() {
            group.sort_by(Detection::chronological);
        }
        groups
    }
}

/// Normalized edit-distance similarity in `[0, 1]`.
///
/// `1 - levenshtein(a, b) / max(|a|, |b|)`, counted in characters. Two empty
/// strings are identical.
///
/// # Example
/// ```
/// use trajectory_matcher::identity::normalized_similarity;
///
/// assert_eq!(normalized_similarity("abcd", "abcd"), 1.0);
/// assert_eq!(normalized_similarity("abcd", "abce"), 0.75);
/// ```
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Character-level Levenshtein distance with a rolling pair of rows.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Upper bound on similarity from lengths alone, used to skip hopeless pairs.
fn length_bound_ok(a: &str, b: &str, threshold: f64) -> bool {
    let (la, lb) = (a.chars().count(), b.chars().count());
    let longest = la.max(lb);
    if longest == 0 {
        return true;
    }
    la.min(lb) as f64 / longest as f64 >= threshold
}

/// Merge raw identifiers into canonical identities.
///
/// The result depends only on the set of identifiers and the config, never on
/// input order or duplicates.
///
/// # Example
/// ```
/// use trajectory_matcher::identity::{merge_identifiers, MergeConfig};
///
/// let ids = ["device-hash-0000000000000000000000001", "device-hash-0000000000000000000000002", "other"];
/// let map = merge_identifiers(ids, &MergeConfig::default()).unwrap();
///
/// assert_eq!(map.len(), 2);
/// assert_eq!(
///     map.canonical_of("device-hash-0000000000000000000000002"),
///     "device-hash-0000000000000000000000001"
/// );
/// ```
pub fn merge_identifiers<I, S>(identifiers: I, config: &MergeConfig) -> Result<IdentityMap>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    config.validate()?;

    let distinct: BTreeSet<String> = identifiers
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect();

    let static_targets: BTreeSet<&str> = config.static_mapping.values().map(String::as_str).collect();

    let mut canonical: HashMap<String, String> = HashMap::new();
    let mut members: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut graph_nodes: Vec<&str> = Vec::new();

    for id in &distinct {
        if let Some(target) = config.static_mapping.get(id) {
            canonical.insert(id.clone(), target.clone());
            members.entry(target.clone()).or_default().insert(id.clone());
        } else if static_targets.contains(id.as_str()) {
            canonical.insert(id.clone(), id.clone());
            members.entry(id.clone()).or_default().insert(id.clone());
        } else {
            graph_nodes.push(id);
        }
    }

    let threshold = config.similarity_threshold;
    let mut uf: UnionFind<&str> = UnionFind::new();
    for &node in &graph_nodes {
        uf.make_set(node);
    }

    for (i, &a) in graph_nodes.iter().enumerate() {
        for &b in &graph_nodes[i + 1..] {
            if !length_bound_ok(a, b, threshold) {
                continue;
            }
            if normalized_similarity(a, b) >= threshold {
                uf.union(&a, &b);
            }
        }
    }

    for (_, component) in uf.groups() {
        // Smallest member keeps the representative independent of union order
        let Some(representative) = component.iter().min().map(|s| s.to_string()) else {
            continue;
        };
        let entry = members.entry(representative.clone()).or_default();
        for member in component {
            canonical.insert(member.to_string(), representative.clone());
            entry.insert(member.to_string());
        }
    }

    let identities: Vec<CanonicalIdentity> = members
        .into_iter()
        .map(|(id, members)| CanonicalIdentity {
            id,
            members: members.into_iter().collect(),
        })
        .collect();

    info!(
        "Merged {} raw identifiers into {} canonical identities",
        distinct.len(),
        identities.len()
    );

    Ok(IdentityMap {
        canonical,
        identities,
    })
}

/// Merge the identifiers observed across a batch of detections.
pub fn merge_detections(detections: &[Detection], config: &MergeConfig) -> Result<IdentityMap> {
    merge_identifiers(detections.iter().map(|d| d.raw_identifier.as_str()), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_known_values() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("abc"), &chars("abc")), 0);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(normalized_similarity("", ""), 1.0);
        assert_eq!(normalized_similarity("abc", ""), 0.0);
        assert_eq!(normalized_similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_length_bound_skips_only_hopeless_pairs() {
        assert!(!length_bound_ok("a", "abcdefghij", 0.95));
        assert!(length_bound_ok("abcdefghij", "abcdefghik", 0.9));
    }

    #[test]
    fn test_static_mapping_takes_precedence() {
        let mut config = MergeConfig::default();
        config
            .static_mapping
            .insert("C_01_base_hash".to_string(), "C_01_integrated".to_string());
        config
            .static_mapping
            .insert("C_01_sub_hash".to_string(), "C_01_integrated".to_string());

        let map = merge_identifiers(["C_01_base_hash", "C_01_sub_hash", "X"], &config).unwrap();
        assert_eq!(map.canonical_of("C_01_base_hash"), "C_01_integrated");
        assert_eq!(map.canonical_of("C_01_sub_hash"), "C_01_integrated");
        assert_eq!(map.canonical_of("X"), "X");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_unknown_identifier_is_singleton() {
        let map = merge_identifiers(Vec::<String>::new(), &MergeConfig::default()).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.canonical_of("never-seen"), "never-seen");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = MergeConfig {
            similarity_threshold: 1.2,
            ..MergeConfig::default()
        };
        let err = merge_identifiers(["a"], &config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_transitive_chain_merges() {
        // a~b and b~c but a is not similar enough to c
        let config = MergeConfig {
            similarity_threshold: 0.75,
            ..MergeConfig::default()
        };
        assert!(normalized_similarity("aaaa", "aabb") < 0.75);
        let map = merge_identifiers(["aaaa", "aaab", "aabb"], &config).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.canonical_of("aabb"), "aaaa");
    }

    #[test]
    fn test_chained_static_mapping_rejected() {
        let mut config = MergeConfig::default();
        config.static_mapping.insert("K".to_string(), "T".to_string());
        config.static_mapping.insert("T".to_string(), "U".to_string());

        let err = merge_identifiers(["K", "T"], &config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_self_mapped_target_is_stable() {
        let mut config = MergeConfig::default();
        config.static_mapping.insert("K".to_string(), "T".to_string());
        config.static_mapping.insert("T".to_string(), "T".to_string());

        let first = merge_identifiers(["K", "T"], &config).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.identities()[0].members, vec!["K", "T"]);

        let second = merge_identifiers(["T"], &config).unwrap();
        assert_eq!(second.canonical_of("T"), "T");
        assert_eq!(second.len(), 1);
    }
}
