//! # Feasibility Clustering
//!
//! Splits one canonical identity's detections into clusters that a single
//! walker could physically have produced. One cluster approximates one real
//! visit by one device.
//!
//! ## Algorithm
//! 1. Sort detections chronologically and group consecutive same-detector
//!    detections (gap below `merge_gap_seconds`) into provisional stays.
//! 2. Walk the provisional stays. A transition between different detectors is
//!    impossible when the elapsed time is shorter than
//!    `distance / max_walker_speed` (scaled by `feasibility_factor`).
//! 3. On an impossible transition the configured [`ClusteringStrategy`]
//!    decides: split immediately, or look ahead for a reachable stay and defer
//!    the stays skipped over.
//! 4. Deferred stays are clustered again in further passes until every stay
//!    belongs to exactly one cluster.
//!
//! Within every produced cluster, each consecutive cross-detector transition
//! satisfies `gap >= min_travel_time * feasibility_factor`.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_in_range, ensure_non_negative, ensure_positive, Result, TrajectoryError};
use crate::geo_utils::{is_feasible_transition, min_travel_time};
use crate::{Detection, DetectorTable};

/// Packet sequence numbers wrap at this value.
const SEQUENCE_MODULUS: u32 = 4096;

/// Sequence jumps larger than this across an impossible move suggest a different device.
const SEQUENCE_JUMP_THRESHOLD: u32 = 64;

/// How to react when a cluster meets an impossible move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusteringStrategy {
    /// Close the cluster and start a new one at the offending stay.
    ImpossibleMove,
    /// Look at most `max_lookahead` stays ahead for one reachable from the
    /// cluster's last stay. Skipped stays are deferred to a later pass.
    ImpossibleMoveWithWindow { max_lookahead: usize },
    /// Like the windowed strategy but scans to the end of the sequence.
    WindowMax,
}

impl ClusteringStrategy {
    /// Number of stays inspected after an impossible move (`None` = unbounded).
    fn lookahead(&self) -> Option<usize> {
        match self {
            Self::ImpossibleMove => Some(0),
            Self::ImpossibleMoveWithWindow { max_lookahead } => Some(*max_lookahead),
            Self::WindowMax => None,
        }
    }
}

/// Configuration for feasibility clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Same-detector detections closer than this many seconds belong to one stay.
    /// Default: 900.0 (15 minutes)
    pub merge_gap_seconds: f64,

    /// Conservative upper bound on walking speed in m/s.
    /// Default: 1.4
    pub max_walker_speed: f64,

    /// Scale applied to the minimum travel time before comparing.
    /// Values below 1.0 tolerate clock skew between detectors. Default: 1.0
    pub feasibility_factor: f64,

    /// Reaction to impossible moves. Default: [`ClusteringStrategy::ImpossibleMove`]
    pub strategy: ClusteringStrategy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            merge_gap_seconds: 900.0,
            max_walker_speed: 1.4,
            feasibility_factor: 1.0,
            strategy: ClusteringStrategy::ImpossibleMove,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("max_walker_speed", self.max_walker_speed)?;
        ensure_non_negative("merge_gap_seconds", self.merge_gap_seconds)?;
        ensure_positive("feasibility_factor", self.feasibility_factor)?;
        ensure_in_range("feasibility_factor", self.feasibility_factor, 0.0, 1.0)?;
        if let ClusteringStrategy::ImpossibleMoveWithWindow { max_lookahead: 0 } = self.strategy {
            return Err(TrajectoryError::config(
                "strategy.max_lookahead",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Contiguous detections of one device at one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalStay {
    pub detector_id: String,
    /// Never empty, chronologically ordered
    pub detections: Vec<Detection>,
}

impl ProvisionalStay {
    fn start(detection: Detection) -> Self {
        Self {
            detector_id: detection.detector_id.clone(),
            detections: vec![detection],
        }
    }

    pub fn first_timestamp(&self) -> f64 {
        self.detections.first().map_or(f64::NAN, |d| d.timestamp)
    }

    pub fn last_timestamp(&self) -> f64 {
        self.detections.last().map_or(f64::NAN, |d| d.timestamp)
    }

    fn first_sequence(&self) -> Option<u32> {
        self.detections.first().map(|d| d.sequence_number)
    }

    fn last_sequence(&self) -> Option<u32> {
        self.detections.last().map(|d| d.sequence_number)
    }
}

/// A physically consistent sub-sequence of one identity's detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// `"{canonical_id}_cluster{n}"`, `n` counted from 1 in chronological order
    pub id: String,
    pub canonical_id: String,
    /// Stays in visit order
    pub stays: Vec<ProvisionalStay>,
}

impl Cluster {
    pub fn first_timestamp(&self) -> f64 {
        self.stays.first().map_or(f64::NAN, ProvisionalStay::first_timestamp)
    }

    pub fn detection_count(&self) -> usize {
        self.stays.iter().map(|s| s.detections.len()).sum()
    }

    pub fn detections(&self) -> impl Iterator<Item = &Detection> {
        self.stays.iter().flat_map(|s| s.detections.iter())
    }
}

/// Group chronologically sorted detections into provisional stays.
///
/// A new stay starts whenever the detector changes or the gap since the
/// previous detection at the same detector reaches `merge_gap`.
pub fn build_provisional_stays(detections: &[Detection], merge_gap: f64) -> Vec<ProvisionalStay> {
    let mut stays: Vec<ProvisionalStay> = Vec::new();

    for detection in detections {
        match stays.last_mut() {
            Some(stay)
                if stay.detector_id == detection.detector_id
                    && detection.timestamp - stay.last_timestamp() < merge_gap =>
            {
                stay.detections.push(detection.clone());
            }
            _ => stays.push(ProvisionalStay::start(detection.clone())),
        }
    }

    stays
}

/// Feasibility check between two stays, bound to one detector table and config.
struct TransitionCheck<'a> {
    detectors: &'a DetectorTable,
    config: &'a ClusterConfig,
}

impl TransitionCheck<'_> {
    fn is_feasible(&self, prev: &ProvisionalStay, next: &ProvisionalStay) -> Result<bool> {
        if prev.detector_id == next.detector_id {
            return Ok(true);
        }
        let from = self.detectors.require(&prev.detector_id, "a detection")?;
        let to = self.detectors.require(&next.detector_id, "a detection")?;
        let min_time = min_travel_time(from, to, self.config.max_walker_speed)?;
        let gap = next.first_timestamp() - prev.last_timestamp();

        Ok(is_feasible_transition(gap, min_time, self.config.feasibility_factor))
    }
}

fn sequence_jump(prev: &ProvisionalStay, next: &ProvisionalStay) -> Option<u32> {
    let a = prev.last_sequence()? % SEQUENCE_MODULUS;
    let b = next.first_sequence()? % SEQUENCE_MODULUS;
    let diff = a.abs_diff(b);
    Some(diff.min(SEQUENCE_MODULUS - diff))
}

/// Append a stay, folding it into the last one when it continues the same visit.
fn append_stay(cluster: &mut Vec<ProvisionalStay>, stay: ProvisionalStay, merge_gap: f64) {
    if let Some(last) = cluster.last_mut() {
        if last.detector_id == stay.detector_id && stay.first_timestamp() - last.last_timestamp() < merge_gap {
            last.detections.extend(stay.detections);
            return;
        }
    }
    cluster.push(stay);
}

/// One scan over `stays`. Returns the clusters formed and the stays deferred.
fn clustering_pass(
    stays: Vec<ProvisionalStay>,
    check: &TransitionCheck<'_>,
    canonical_id: &str,
) -> Result<(Vec<Vec<ProvisionalStay>>, Vec<ProvisionalStay>)> {
    let merge_gap = check.config.merge_gap_seconds;
    let lookahead = check.config.strategy.lookahead();

    let mut slots: Vec<Option<ProvisionalStay>> = stays.into_iter().map(Some).collect();
    let n = slots.len();

    let mut clusters: Vec<Vec<ProvisionalStay>> = Vec::new();
    let mut deferred: Vec<ProvisionalStay> = Vec::new();
    let mut current: Vec<ProvisionalStay> = Vec::new();

    let mut i = 0;
    while i < n {
        let Some(stay) = slots[i].take() else {
            i += 1;
            continue;
        };

        let Some(last) = current.last() else {
            current.push(stay);
            i += 1;
            continue;
        };

        if check.is_feasible(last, &stay)? {
            append_stay(&mut current, stay, merge_gap);
            i += 1;
            continue;
        }

        debug!(
            "[{}] impossible move {}→{} (gap {:.1}s)",
            canonical_id,
            last.detector_id,
            stay.detector_id,
            stay.first_timestamp() - last.last_timestamp()
        );
        if let Some(jump) = sequence_jump(last, &stay) {
            if jump > SEQUENCE_JUMP_THRESHOLD {
                debug!("[{}] sequence jump of {} across impossible move", canonical_id, jump);
            }
        }

        let window_end = match lookahead {
            Some(k) => (i + 1 + k).min(n),
            None => n,
        };
        let mut found = None;
        for j in (i + 1)..window_end {
            if let Some(candidate) = slots[j].as_ref() {
                if check.is_feasible(last, candidate)? {
                    found = Some(j);
                    break;
                }
            }
        }

        match found {
            Some(j) => {
                debug!("[{}] bridged over {} stay(s), deferring them", canonical_id, j - i);
                deferred.push(stay);
                for slot in &mut slots[(i + 1)..j] {
                    deferred.extend(slot.take());
                }
                if let Some(reachable) = slots[j].take() {
                    append_stay(&mut current, reachable, merge_gap);
                }
                i = j + 1;
            }
            None => {
                clusters.push(std::mem::take(&mut current));
                current.push(stay);
                i += 1;
            }
        }
    }

    if !current.is_empty() {
        clusters.push(current);
    }

    Ok((clusters, deferred))
}

/// Cluster the detections of one canonical identity.
///
/// Detections need not be pre-sorted. Every detection ends up in exactly one
/// cluster; an identity with a single detection yields one single-stay cluster.
pub fn cluster_identity(
    canonical_id: &str,
    detections: &[Detection],
    detectors: &DetectorTable,
    config: &ClusterConfig,
) -> Result<Vec<Cluster>> {
    if detections.is_empty() {
        return Ok(vec![]);
    }

    let mut sorted = detections.to_vec();
    sorted.sort_by(Detection::chronological);

    let check = TransitionCheck { detectors, config };
    let mut pending = build_provisional_stays(&sorted, config.merge_gap_seconds);
    let mut groups: Vec<Vec<ProvisionalStay>> = Vec::new();

    while !pending.is_empty() {
        let (formed, deferred) = clustering_pass(pending, &check, canonical_id)?;
        groups.extend(formed);
        pending = deferred;
    }

    groups.sort_by(|a, b| {
        let ta = a.first().map_or(f64::NAN, ProvisionalStay::first_timestamp);
        let tb = b.first().map_or(f64::NAN, ProvisionalStay::first_timestamp);
        ta.total_cmp(&tb)
    });

    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(n, stays)| Cluster {
            id: format!("{}_cluster{}", canonical_id, n + 1),
            canonical_id: canonical_id.to_string(),
            stays,
        })
        .collect())
}

/// Cluster every canonical identity. Output follows identity order, then
/// chronological order within each identity.
pub fn cluster_identities(
    groups: &BTreeMap<String, Vec<Detection>>,
    detectors: &DetectorTable,
    config: &ClusterConfig,
) -> Result<Vec<Cluster>> {
    config.validate()?;

    let mut clusters = Vec::new();
    for (canonical_id, detections) in groups {
        clusters.extend(cluster_identity(canonical_id, detections, detectors, config)?);
    }

    info!("Clustered {} identities into {} clusters", groups.len(), clusters.len());
    Ok(clusters)
}

/// Cluster every canonical identity using parallel processing.
///
/// Identities share no state, so each is clustered independently. The output
/// is identical to [`cluster_identities`].
#[cfg(feature = "parallel")]
pub fn cluster_identities_parallel(
    groups: &BTreeMap<String, Vec<Detection>>,
    detectors: &DetectorTable,
    config: &ClusterConfig,
) -> Result<Vec<Cluster>> {
    use rayon::prelude::*;

    config.validate()?;

    let entries: Vec<(&String, &Vec<Detection>)> = groups.iter().collect();
    let per_identity: Vec<Vec<Cluster>> = entries
        .par_iter()
        .map(|(canonical_id, detections)| cluster_identity(canonical_id, detections, detectors, config))
        .collect::<Result<Vec<_>>>()?;

    let clusters: Vec<Cluster> = per_identity.into_iter().flatten().collect();
    info!("Clustered {} identities into {} clusters", groups.len(), clusters.len());
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Detector;

    fn detectors() -> DetectorTable {
        DetectorTable::new(vec![
            Detector::new("A", 0.0, 0.0),
            Detector::new("B", 100.0, 0.0),
            Detector::new("C", 200.0, 0.0),
        ])
        .unwrap()
    }

    fn det(t: f64, detector: &str, seq: u32) -> Detection {
        Detection::new(t, detector, "dev", seq)
    }

    #[test]
    fn test_provisional_stays_respect_merge_gap() {
        let detections = vec![
            det(0.0, "A", 1),
            det(10.0, "A", 2),
            det(2000.0, "A", 3),
            det(2100.0, "B", 4),
        ];
        let stays = build_provisional_stays(&detections, 900.0);
        assert_eq!(stays.len(), 3);
        assert_eq!(stays[0].detections.len(), 2);
        assert_eq!(stays[1].detector_id, "A");
        assert_eq!(stays[2].detector_id, "B");
    }

    #[test]
    fn test_impossible_move_splits() {
        // 100m at 1.4 m/s needs ~71.4s, only 5s elapsed
        let detections = vec![det(0.0, "A", 1), det(5.0, "B", 2)];
        let clusters = cluster_identity("dev", &detections, &detectors(), &ClusterConfig::default()).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id, "dev_cluster1");
        assert_eq!(clusters[1].id, "dev_cluster2");
        assert_eq!(clusters[1].stays[0].detector_id, "B");
    }

    #[test]
    fn test_feasible_move_stays_together() {
        let detections = vec![det(0.0, "A", 1), det(100.0, "B", 2), det(200.0, "C", 3)];
        let clusters = cluster_identity("dev", &detections, &detectors(), &ClusterConfig::default()).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].stays.len(), 3);
    }

    #[test]
    fn test_exact_travel_time_is_feasible() {
        let table = DetectorTable::new(vec![Detector::new("A", 0.0, 0.0), Detector::new("B", 140.0, 0.0)]).unwrap();
        // 140m / 1.4 m/s = 100s exactly
        let detections = vec![det(0.0, "A", 1), det(100.0, "B", 2)];
        let clusters = cluster_identity("dev", &detections, &table, &ClusterConfig::default()).unwrap();
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_window_defers_noise_stay() {
        // A at 0, spurious C at 3 (impossible), B at 120 (reachable from A)
        let detections = vec![det(0.0, "A", 1), det(3.0, "C", 900), det(120.0, "B", 2)];
        let config = ClusterConfig {
            strategy: ClusteringStrategy::ImpossibleMoveWithWindow { max_lookahead: 2 },
            ..ClusterConfig::default()
        };
        let clusters = cluster_identity("dev", &detections, &detectors(), &config).unwrap();
        assert_eq!(clusters.len(), 2);

        let routes: Vec<Vec<&str>> = clusters
            .iter()
            .map(|c| c.stays.iter().map(|s| s.detector_id.as_str()).collect())
            .collect();
        assert_eq!(routes[0], vec!["A", "B"]);
        assert_eq!(routes[1], vec!["C"]);
        assert_eq!(clusters.iter().map(Cluster::detection_count).sum::<usize>(), 3);
    }

    #[test]
    fn test_window_falls_back_to_split() {
        let detections = vec![det(0.0, "A", 1), det(3.0, "C", 2), det(6.0, "B", 3)];
        let config = ClusterConfig {
            strategy: ClusteringStrategy::WindowMax,
            ..ClusterConfig::default()
        };
        let clusters = cluster_identity("dev", &detections, &detectors(), &config).unwrap();
        // Nothing reachable from A, so C starts a new cluster; B is unreachable from C too
        assert_eq!(clusters.len(), 3);
    }

    #[test]
    fn test_unknown_detector_is_referential_error() {
        let detections = vec![det(0.0, "A", 1), det(500.0, "Z", 2)];
        let err = cluster_identity("dev", &detections, &detectors(), &ClusterConfig::default()).unwrap_err();
        assert!(err.is_referential());
    }

    #[test]
    fn test_sequence_jump_wraps() {
        let a = ProvisionalStay::start(det(0.0, "A", 4090));
        let b = ProvisionalStay::start(det(1.0, "B", 5));
        assert_eq!(sequence_jump(&a, &b), Some(11));
    }

    #[test]
    fn test_config_validation() {
        let config = ClusterConfig {
            max_walker_speed: 0.0,
            ..ClusterConfig::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());

        let config = ClusterConfig {
            strategy: ClusteringStrategy::ImpossibleMoveWithWindow { max_lookahead: 0 },
            ..ClusterConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
