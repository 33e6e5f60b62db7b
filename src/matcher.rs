//! Two-tier positional pairing of feature collections.
//!
//! Tier one pairs features with identical boundaries and strand. Tier two pairs
//! what is left by the coordinate of the stop codon, which catches annotations
//! that only disagree on the start codon. A key that occurs more than once on
//! either side is never used for pairing at that tier.

use crate::genome::{CdsFeature, EndKey, ExactKey};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Anything that can be paired positionally.
pub trait Matchable {
    fn exact_key(&self) -> ExactKey;
    fn end_key(&self) -> Option<EndKey>;
}

impl Matchable for CdsFeature {
    fn exact_key(&self) -> ExactKey {
        CdsFeature::exact_key(self)
    }

    fn end_key(&self) -> Option<EndKey> {
        CdsFeature::end_key(self)
    }
}

/// Index-based result of pairing collection A against collection B.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMatch {
    pub perfect: Vec<(usize, usize)>,
    pub imperfect: Vec<(usize, usize)>,
    pub a_only: Vec<usize>,
    pub b_only: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTally {
    pub perfect: usize,
    pub imperfect: usize,
    pub a_only: usize,
    pub b_only: usize,
}

impl FeatureMatch {
    pub fn tally(&self) -> MatchTally {
        MatchTally {
            perfect: self.perfect.len(),
            imperfect: self.imperfect.len(),
            a_only: self.a_only.len(),
            b_only: self.b_only.len(),
        }
    }

    /// The same result seen from B's side.
    pub fn swapped(&self) -> Self {
        let flip = |pairs: &[(usize, usize)]| -> Vec<(usize, usize)> {
            pairs.iter().map(|(a, b)| (*b, *a)).sorted().collect()
        };
        Self {
            perfect: flip(&self.perfect),
            imperfect: flip(&self.imperfect),
            a_only: self.b_only.clone(),
            b_only: self.a_only.clone(),
        }
    }
}

/// Maps each key occurring exactly once to the index carrying it.
fn unique_keys<K, F>(indices: &[usize], key_of: F) -> HashMap<K, usize>
where
    K: Eq + Hash + Clone,
    F: Fn(usize) -> Option<K>,
{
    let keyed: Vec<(K, usize)> = indices
        .iter()
        .filter_map(|idx| key_of(*idx).map(|key| (key, *idx)))
        .collect();
    let counts = keyed.iter().map(|(key, _)| key.clone()).counts();
    keyed
        .into_iter()
        .filter(|(key, _)| counts.get(key) == Some(&1))
        .collect()
}

/// Pairs indices whose key is unique on both sides; returns the pairs sorted
/// by A index.
fn intersect_tier<K, FA, FB>(
    a_remaining: &[usize],
    b_remaining: &[usize],
    key_a: FA,
    key_b: FB,
) -> Vec<(usize, usize)>
where
    K: Eq + Hash + Clone,
    FA: Fn(usize) -> Option<K>,
    FB: Fn(usize) -> Option<K>,
{
    let a_keys = unique_keys(a_remaining, key_a);
    let b_keys = unique_keys(b_remaining, key_b);
    a_keys
        .iter()
        .filter_map(|(key, a_idx)| b_keys.get(key).map(|b_idx| (*a_idx, *b_idx)))
        .sorted()
        .collect()
}

fn remaining(total: usize, taken: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut used = vec![false; total];
    taken.for_each(|idx| used[idx] = true);
    (0..total).filter(|idx| !used[*idx]).collect()
}

pub fn match_features<T: Matchable>(a: &[T], b: &[T]) -> FeatureMatch {
    let all_a: Vec<usize> = (0..a.len()).collect();
    let all_b: Vec<usize> = (0..b.len()).collect();

    let perfect = intersect_tier(
        &all_a,
        &all_b,
        |i| Some(a[i].exact_key()),
        |i| Some(b[i].exact_key()),
    );
    let a_rest = remaining(a.len(), perfect.iter().map(|p| p.0));
    let b_rest = remaining(b.len(), perfect.iter().map(|p| p.1));

    let imperfect = intersect_tier(&a_rest, &b_rest, |i| a[i].end_key(), |i| b[i].end_key());
    let a_only = remaining(
        a.len(),
        perfect.iter().chain(imperfect.iter()).map(|p| p.0),
    );
    let b_only = remaining(
        b.len(),
        perfect.iter().chain(imperfect.iter()).map(|p| p.1),
    );

    FeatureMatch {
        perfect,
        imperfect,
        a_only,
        b_only,
    }
}
