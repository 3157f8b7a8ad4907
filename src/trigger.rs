//! Trigger decision packing.
//!
//! A configured, ordered list of path patterns (glob syntax, e.g.
//! `HLT_Mu*`) maps onto a bitset: bit `k` is set when any accepted path name
//! matches pattern `k`. Bits are packed into 32-bit words, pattern `k` living
//! in word `k / 32` at bit `k % 32`, so `L` patterns need `ceil(L / 32)` words.
//!
//! Patterns are compiled once; matching is case-sensitive and anchored on the
//! full path name.
//!
//! # Example
//!
//! ```
//! use jet_ntuplizer::trigger::TriggerBitPacker;
//! use jet_ntuplizer::types::TriggerResults;
//!
//! let packer = TriggerBitPacker::new(["HLT_Mu*", "HLT_El*"]).unwrap();
//! let packed = packer.pack(&TriggerResults::all_accepted(["HLT_Mu20_v1"]));
//!
//! assert_eq!(packed.bits.words(), &[1]);
//! assert!(packed.issue.is_none());
//! ```

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::{NtupleError, Result};
use crate::types::TriggerResults;

/// Width of one packed trigger word.
pub const BITS_PER_WORD: usize = 32;

/// Packed trigger bits for one event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerBits {
    words: Vec<u32>,
}

impl TriggerBits {
    /// All-clear bitset sized for `n_patterns`.
    pub fn new(n_patterns: usize) -> Self {
        Self {
            words: vec![0; Self::word_count(n_patterns)],
        }
    }

    /// Words needed for `n_patterns` bits.
    #[inline]
    pub fn word_count(n_patterns: usize) -> usize {
        n_patterns.div_ceil(BITS_PER_WORD)
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.words[index / BITS_PER_WORD] |= 1 << (index % BITS_PER_WORD);
    }

    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        self.words
            .get(index / BITS_PER_WORD)
            .is_some_and(|w| w & (1 << (index % BITS_PER_WORD)) != 0)
    }

    /// Whether any pattern fired.
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }
}

/// A problem with the raw trigger input. Packing still completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerIssue {
    /// Path names could not be retrieved; all bits left unset
    NamesNotFound,
    /// Names and decisions differ in length; only the common prefix was used
    LengthMismatch { names: usize, decisions: usize },
}

/// Result of packing one event's decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedTrigger {
    pub bits: TriggerBits,
    pub issue: Option<TriggerIssue>,
}

/// Compiled trigger patterns.
#[derive(Debug, Clone)]
pub struct TriggerBitPacker {
    patterns: Vec<String>,
    matchers: Vec<GlobMatcher>,
}

impl TriggerBitPacker {
    /// Compile `patterns` in order.
    pub fn new<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut compiled = Vec::new();
        let mut matchers = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(false)
                .build()
                .map_err(|e| NtupleError::InvalidTriggerPattern {
                    pattern: pattern.to_string(),
                    reason: e.kind().to_string(),
                })?;
            matchers.push(glob.compile_matcher());
            compiled.push(pattern.to_string());
        }

        log::debug!("Compiled {} trigger patterns", compiled.len());

        Ok(Self {
            patterns: compiled,
            matchers,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether pattern `index` matches `name`.
    pub fn matches(&self, index: usize, name: &str) -> bool {
        self.matchers
            .get(index)
            .is_some_and(|m| m.is_match(name))
    }

    /// Pack one event's decisions.
    pub fn pack(&self, results: &TriggerResults) -> PackedTrigger {
        let mut bits = TriggerBits::new(self.patterns.len());

        let Some(names) = results.names.as_ref() else {
            log::error!("Could not get trigger names");
            return PackedTrigger {
                bits,
                issue: Some(TriggerIssue::NamesNotFound),
            };
        };

        let mut issue = None;
        if names.len() != results.accept.len() {
            log::error!(
                "Length of names and paths not the same: {},{}",
                names.len(),
                results.accept.len()
            );
            issue = Some(TriggerIssue::LengthMismatch {
                names: names.len(),
                decisions: results.accept.len(),
            });
        }

        for (name, &accepted) in names.iter().zip(&results.accept) {
            if !accepted {
                continue;
            }
            for (k, matcher) in self.matchers.iter().enumerate() {
                if matcher.is_match(name.as_str()) {
                    bits.set(k);
                }
            }
        }

        PackedTrigger { bits, issue }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(names: &[&str], accept: &[bool]) -> TriggerResults {
        TriggerResults {
            accept: accept.to_vec(),
            names: Some(names.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn test_single_accepted_path() {
        let packer = TriggerBitPacker::new(["HLT_Mu*", "HLT_El*"]).unwrap();
        let packed = packer.pack(&TriggerResults::all_accepted(["HLT_Mu20_v1"]));
        assert_eq!(packed.bits.words(), &[1]);
        assert!(packed.bits.is_set(0));
        assert!(!packed.bits.is_set(1));
    }

    #[test]
    fn test_word_count_is_ceiling() {
        assert_eq!(TriggerBits::word_count(0), 0);
        assert_eq!(TriggerBits::word_count(1), 1);
        assert_eq!(TriggerBits::word_count(32), 1);
        assert_eq!(TriggerBits::word_count(33), 2);
        assert_eq!(TriggerBits::word_count(64), 2);
    }

    #[test]
    fn test_bits_beyond_first_word() {
        let patterns: Vec<String> = (0..40).map(|i| format!("HLT_Path{i}_v*")).collect();
        let packer = TriggerBitPacker::new(&patterns).unwrap();
        let packed = packer.pack(&TriggerResults::all_accepted(["HLT_Path35_v2", "HLT_Path3_v1"]));

        assert_eq!(packed.bits.words().len(), 2);
        assert!(packed.bits.is_set(35));
        assert!(packed.bits.is_set(3));
        assert_eq!(packed.bits.words()[0], 1 << 3);
        assert_eq!(packed.bits.words()[1], 1 << 3);
    }

    #[test]
    fn test_rejected_paths_do_not_set_bits() {
        let packer = TriggerBitPacker::new(["HLT_Mu*"]).unwrap();
        let packed = packer.pack(&results(&["HLT_Mu20_v1", "HLT_Mu8_v3"], &[false, false]));
        assert!(!packed.bits.any());
    }

    #[test]
    fn test_match_is_anchored_and_case_sensitive() {
        let packer = TriggerBitPacker::new(["HLT_Mu*", "Jet?0"]).unwrap();
        assert!(packer.matches(0, "HLT_Mu50"));
        assert!(!packer.matches(0, "XHLT_Mu50"));
        assert!(!packer.matches(0, "hlt_mu50"));
        assert!(packer.matches(1, "Jet40"));
        assert!(!packer.matches(1, "Jet400"));
    }

    #[test]
    fn test_one_name_can_set_several_bits() {
        let packer = TriggerBitPacker::new(["HLT_*", "HLT_PFJet*", "HLT_Mu*"]).unwrap();
        let packed = packer.pack(&TriggerResults::all_accepted(["HLT_PFJet80_v1"]));
        assert_eq!(packed.bits.words(), &[0b011]);
    }

    #[test]
    fn test_missing_names_leave_bits_unset() {
        let packer = TriggerBitPacker::new(["*"]).unwrap();
        let packed = packer.pack(&TriggerResults {
            accept: vec![true, true],
            names: None,
        });
        assert!(!packed.bits.any());
        assert_eq!(packed.issue, Some(TriggerIssue::NamesNotFound));
    }

    #[test]
    fn test_length_mismatch_uses_common_prefix() {
        let packer = TriggerBitPacker::new(["A*", "B*"]).unwrap();
        let packed = packer.pack(&results(&["A1", "B1"], &[true]));
        assert!(packed.bits.is_set(0));
        assert!(!packed.bits.is_set(1));
        assert_eq!(
            packed.issue,
            Some(TriggerIssue::LengthMismatch {
                names: 2,
                decisions: 1
            })
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = TriggerBitPacker::new(["HLT_[Mu"]).unwrap_err();
        assert!(matches!(err, NtupleError::InvalidTriggerPattern { .. }));
    }
}
