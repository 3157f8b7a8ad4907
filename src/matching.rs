//! Cross-collection object matching.
//!
//! Two kinds of matching link the jet collections of an event:
//!
//! - **Proximity**: [`GreedyNearestMatcher`] pairs each groomed fat jet with
//!   the nearest unclaimed original fat jet in (η, φ) space.
//! - **Identity**: [`SubjetMembership`] and [`KeyIndex`] follow the
//!   [`ObjectKey`] links a groomed jet keeps to its subjets.
//!
//! # Greedy policy
//!
//! Candidates are visited once, in input order. Each one claims the closest
//! reference not yet claimed and keeps it; there is no backtracking. A later
//! candidate can therefore lose its nearest reference to an earlier one and
//! end up with a worse partner or none at all. The result is injective and
//! fully determined by input order, but it is not a global optimum.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::types::{Direction, Jet, ObjectKey};

/// Longitudinal coordinate used for proximity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCoordinate {
    /// Pseudorapidity η
    #[default]
    Pseudorapidity,
    /// Rapidity y, which differs from η for massive jets
    Rapidity,
}

/// A position in (longitudinal, φ) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPoint {
    pub eta: f64,
    pub phi: f64,
}

impl MatchPoint {
    pub const fn new(eta: f64, phi: f64) -> Self {
        Self { eta, phi }
    }

    /// The point a jet occupies under `coordinate`.
    pub fn of_jet(jet: &Jet, coordinate: MatchCoordinate) -> Self {
        let eta = match coordinate {
            MatchCoordinate::Pseudorapidity => jet.eta(),
            MatchCoordinate::Rapidity => jet.p4.rapidity(),
        };
        Self::new(eta, jet.phi())
    }

    #[inline]
    fn distance2(&self, other: &MatchPoint) -> f64 {
        crate::types::delta_r2(self.eta, self.phi, other.eta, other.phi)
    }
}

/// Outcome of one matching call. `-1` marks an unmatched entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// For each candidate, the index of its reference
    pub candidate_to_reference: Vec<i32>,
    /// For each reference, the index of the candidate that claimed it
    pub reference_to_candidate: Vec<i32>,
}

impl MatchResult {
    /// Reference matched to candidate `index`.
    pub fn reference_for(&self, index: usize) -> Option<usize> {
        self.candidate_to_reference
            .get(index)
            .and_then(|&r| usize::try_from(r).ok())
    }

    /// Candidate matched to reference `index`.
    pub fn candidate_for(&self, index: usize) -> Option<usize> {
        self.reference_to_candidate
            .get(index)
            .and_then(|&c| usize::try_from(c).ok())
    }

    /// Number of candidates left without a reference.
    pub fn unmatched_candidates(&self) -> usize {
        self.candidate_to_reference.iter().filter(|&&r| r < 0).count()
    }
}

/// One-shot greedy nearest-neighbour matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyNearestMatcher {
    coordinate: MatchCoordinate,
}

impl GreedyNearestMatcher {
    pub fn new(coordinate: MatchCoordinate) -> Self {
        Self { coordinate }
    }

    pub fn coordinate(&self) -> MatchCoordinate {
        self.coordinate
    }

    /// Match candidates to references by ΔR².
    ///
    /// Only a strictly smaller distance replaces the current best, so among
    /// equidistant references the earliest one wins.
    pub fn match_points(&self, reference: &[MatchPoint], candidates: &[MatchPoint]) -> MatchResult {
        let mut claimed = vec![false; reference.len()];
        let mut candidate_to_reference = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let mut best: Option<usize> = None;
            let mut best_distance2 = f64::INFINITY;

            for (r, point) in reference.iter().enumerate() {
                if claimed[r] {
                    continue;
                }
                let distance2 = candidate.distance2(point);
                if distance2 < best_distance2 {
                    best_distance2 = distance2;
                    best = Some(r);
                }
            }

            match best {
                Some(r) => {
                    claimed[r] = true;
                    candidate_to_reference.push(r as i32);
                }
                None => candidate_to_reference.push(-1),
            }
        }

        let mut reference_to_candidate = vec![-1; reference.len()];
        for (c, &r) in candidate_to_reference.iter().enumerate() {
            if r >= 0 {
                reference_to_candidate[r as usize] = c as i32;
            }
        }

        MatchResult {
            candidate_to_reference,
            reference_to_candidate,
        }
    }

    /// Match candidate jets (groomed) to reference jets (original).
    pub fn match_jets(&self, reference: &[Jet], candidates: &[Jet]) -> MatchResult {
        let to_points = |jets: &[Jet]| -> Vec<MatchPoint> {
            jets.iter()
                .map(|jet| MatchPoint::of_jet(jet, self.coordinate))
                .collect()
        };
        self.match_points(&to_points(reference), &to_points(candidates))
    }
}

/// First position of each [`ObjectKey`] in a jet collection.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    positions: AHashMap<ObjectKey, usize>,
}

impl KeyIndex {
    pub fn build(jets: &[Jet]) -> Self {
        let mut positions = AHashMap::with_capacity(jets.len());
        for (i, jet) in jets.iter().enumerate() {
            positions.entry(jet.original_key).or_insert(i);
        }
        Self { positions }
    }

    pub fn position(&self, key: ObjectKey) -> Option<usize> {
        self.positions.get(&key).copied()
    }
}

/// Which fat jet owns each subjet key.
///
/// A fat jet owns the subjets listed by its matched groomed partner. When
/// several fat jets list the same subjet, the first fat jet in order owns it.
#[derive(Debug, Clone, Default)]
pub struct SubjetMembership {
    owners: AHashMap<ObjectKey, usize>,
}

impl SubjetMembership {
    /// Build from the fat-jet → groomed-jet map and the groomed collection.
    pub fn build(fat_to_groomed: &[i32], groomed: &[Jet]) -> Self {
        let mut owners = AHashMap::new();
        for (fat_index, &groomed_index) in fat_to_groomed.iter().enumerate() {
            let Some(partner) = usize::try_from(groomed_index)
                .ok()
                .and_then(|g| groomed.get(g))
            else {
                continue;
            };
            for key in &partner.daughter_keys {
                owners.entry(*key).or_insert(fat_index);
            }
        }
        Self { owners }
    }

    /// Index of the owning fat jet, `-1` when none.
    pub fn fat_jet_of(&self, key: ObjectKey) -> i32 {
        self.owners.get(&key).map_or(-1, |&i| i as i32)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FourMomentum;

    fn points(coords: &[(f64, f64)]) -> Vec<MatchPoint> {
        coords.iter().map(|&(e, p)| MatchPoint::new(e, p)).collect()
    }

    fn jet_at(eta: f64, phi: f64, mass: f64, key: u64) -> Jet {
        Jet::new(FourMomentum::from_pt_eta_phi_m(100.0, eta, phi, mass), ObjectKey(key))
    }

    #[test]
    fn test_basic_nearest_match() {
        let matcher = GreedyNearestMatcher::default();
        let result = matcher.match_points(
            &points(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]),
            &points(&[(0.1, 0.0), (1.9, 0.0)]),
        );
        assert_eq!(result.candidate_to_reference, vec![0, 2]);
        assert_eq!(result.reference_to_candidate, vec![0, -1, 1]);
    }

    #[test]
    fn test_greedy_claims_are_not_revisited() {
        // Candidate 0 is slightly closer to r1 than r0 and grabs it, even
        // though candidate 1 sits right on top of r1.
        let matcher = GreedyNearestMatcher::default();
        let result = matcher.match_points(
            &points(&[(0.0, 0.0), (1.0, 0.0)]),
            &points(&[(0.6, 0.0), (1.0, 0.0)]),
        );
        assert_eq!(result.candidate_to_reference, vec![1, 0]);
    }

    #[test]
    fn test_more_candidates_than_references() {
        let matcher = GreedyNearestMatcher::default();
        let result = matcher.match_points(
            &points(&[(0.0, 0.0)]),
            &points(&[(0.1, 0.0), (0.2, 0.0)]),
        );
        assert_eq!(result.candidate_to_reference, vec![0, -1]);
        assert_eq!(result.unmatched_candidates(), 1);
        assert_eq!(result.reference_for(1), None);
        assert_eq!(result.candidate_for(0), Some(0));
    }

    #[test]
    fn test_empty_reference() {
        let matcher = GreedyNearestMatcher::default();
        let result = matcher.match_points(&[], &points(&[(0.0, 0.0)]));
        assert_eq!(result.candidate_to_reference, vec![-1]);
        assert!(result.reference_to_candidate.is_empty());
    }

    #[test]
    fn test_equidistant_tie_goes_to_first_reference() {
        let matcher = GreedyNearestMatcher::default();
        let result = matcher.match_points(
            &points(&[(-0.5, 0.0), (0.5, 0.0)]),
            &points(&[(0.0, 0.0)]),
        );
        assert_eq!(result.candidate_to_reference, vec![0]);
    }

    #[test]
    fn test_phi_wraparound() {
        let matcher = GreedyNearestMatcher::default();
        let result = matcher.match_points(
            &points(&[(0.0, 0.0), (0.0, 3.1)]),
            &points(&[(0.0, -3.1)]),
        );
        assert_eq!(result.candidate_to_reference, vec![1]);
    }

    #[test]
    fn test_rapidity_coordinate_changes_choice() {
        // Heavy reference jet at η = 1.0 sits near y = 0.5.
        let reference = vec![jet_at(1.0, 0.0, 200.0, 1), jet_at(0.6, 0.0, 0.0, 2)];
        let candidates = vec![jet_at(0.82, 0.0, 0.0, 3)];

        let by_eta = GreedyNearestMatcher::new(MatchCoordinate::Pseudorapidity)
            .match_jets(&reference, &candidates);
        let by_rapidity =
            GreedyNearestMatcher::new(MatchCoordinate::Rapidity).match_jets(&reference, &candidates);

        assert_eq!(by_eta.candidate_to_reference, vec![0]);
        assert_eq!(by_rapidity.candidate_to_reference, vec![1]);
    }

    #[test]
    fn test_subjet_membership_first_owner_wins() {
        let mut groomed_a = jet_at(0.0, 0.0, 0.0, 100);
        groomed_a.daughter_keys = vec![ObjectKey(1), ObjectKey(2)];
        let mut groomed_b = jet_at(1.0, 0.0, 0.0, 101);
        groomed_b.daughter_keys = vec![ObjectKey(2), ObjectKey(3)];

        // fat jet 0 has no groomed partner, fat 1 -> groomed 1, fat 2 -> groomed 0
        let membership = SubjetMembership::build(&[-1, 1, 0], &[groomed_a, groomed_b]);

        assert_eq!(membership.fat_jet_of(ObjectKey(1)), 2);
        assert_eq!(membership.fat_jet_of(ObjectKey(2)), 1);
        assert_eq!(membership.fat_jet_of(ObjectKey(3)), 1);
        assert_eq!(membership.fat_jet_of(ObjectKey(9)), -1);
    }

    #[test]
    fn test_key_index_first_position() {
        let jets = vec![jet_at(0.0, 0.0, 0.0, 5), jet_at(0.0, 1.0, 0.0, 7), jet_at(0.0, 2.0, 0.0, 5)];
        let index = KeyIndex::build(&jets);
        assert_eq!(index.position(ObjectKey(5)), Some(0));
        assert_eq!(index.position(ObjectKey(7)), Some(1));
        assert_eq!(index.position(ObjectKey(8)), None);
    }
}
