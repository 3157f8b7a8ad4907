//! Run configuration.
//!
//! All switches are read once, when the projector is built, and never
//! change during a run.
//!
//! # Example
//!
//! ```
//! use jet_ntuplizer::config::{NtuplizerConfig, VertexRepresentation};
//!
//! let config = NtuplizerConfig::default()
//!     .with_subjets(true)
//!     .with_jet_skipping(20.0, 2.5)
//!     .with_trigger_paths(["HLT_PFJet*", "HLT_Mu*"])
//!     .with_discriminant("Jet_Proba", "jetProbabilityBJetTags")
//!     .with_vertex_representation(VertexRepresentation::Composite);
//!
//! assert!(config.validate().is_ok());
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::association::AssociationStrategy;
use crate::error::{NtupleError, Result};
use crate::matching::MatchCoordinate;

/// Which secondary-vertex shape the input carries.
///
/// Fixes the secondary-vertex association strategy for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexRepresentation {
    /// Vertices from a weighted fit: highest-weight owner wins
    #[default]
    Fitted,
    /// Vertices listing constituent references: first containing vertex wins.
    /// Tracks carrying a PV fit-usage flag take the leading vertex from it.
    Composite,
}

impl VertexRepresentation {
    pub fn association_strategy(self) -> AssociationStrategy {
        match self {
            VertexRepresentation::Fitted => AssociationStrategy::MaxWeight,
            VertexRepresentation::Composite => AssociationStrategy::FirstContaining,
        }
    }
}

/// Which tracks form the energy-ratio denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyRatioScope {
    /// Positive-PV-weight selected tracks of every accepted jet in the collection
    #[default]
    Event,
    /// Positive-PV-weight selected tracks of the vertex's own jet
    Jet,
}

/// Projection switches and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NtuplizerConfig {
    /// Project fat jets and treat the primary collection as their subjets
    pub run_subjets: bool,

    /// Drop jets failing the pt/eta cuts
    pub allow_jet_skipping: bool,
    pub min_jet_pt: f64,
    pub max_jet_eta: f64,

    /// Copy generator and pileup summaries for simulated events
    pub store_event_info: bool,

    pub produce_jet_track_tree: bool,
    pub produce_jet_pf_lepton_tree: bool,
    pub store_muon_info: bool,
    pub store_tag_variables: bool,
    pub store_csv_tag_variables: bool,

    /// Ordered trigger path patterns (glob syntax)
    pub trigger_path_names: Vec<String>,

    /// Output label -> provider identifier, in output order
    pub discriminants: IndexMap<String, String>,

    pub vertex_representation: VertexRepresentation,

    /// Coordinate used when matching groomed jets to fat jets
    pub groomed_match_coordinate: MatchCoordinate,

    pub energy_ratio_scope: EnergyRatioScope,

    /// Fixed per-kind capacity of the flat columns; `None` grows freely
    pub layout_capacity: Option<usize>,

    /// Forward recorded warnings to the log
    pub log_warnings: bool,
}

impl Default for NtuplizerConfig {
    fn default() -> Self {
        Self {
            run_subjets: false,
            allow_jet_skipping: true,
            min_jet_pt: 30.0,
            max_jet_eta: 2.5,
            store_event_info: true,
            produce_jet_track_tree: true,
            produce_jet_pf_lepton_tree: true,
            store_muon_info: false,
            store_tag_variables: false,
            store_csv_tag_variables: false,
            trigger_path_names: Vec::new(),
            discriminants: IndexMap::new(),
            vertex_representation: VertexRepresentation::Fitted,
            groomed_match_coordinate: MatchCoordinate::Pseudorapidity,
            energy_ratio_scope: EnergyRatioScope::Event,
            layout_capacity: None,
            log_warnings: true,
        }
    }
}

impl NtuplizerConfig {
    /// Enable/disable the fat-jet and subjet passes.
    pub fn with_subjets(mut self, enabled: bool) -> Self {
        self.run_subjets = enabled;
        self
    }

    /// Skip jets with pt below `min_pt` or |eta| above `max_eta`.
    pub fn with_jet_skipping(mut self, min_pt: f64, max_eta: f64) -> Self {
        self.allow_jet_skipping = true;
        self.min_jet_pt = min_pt;
        self.max_jet_eta = max_eta;
        self
    }

    /// Keep every jet regardless of kinematics.
    pub fn without_jet_skipping(mut self) -> Self {
        self.allow_jet_skipping = false;
        self
    }

    pub fn with_event_info(mut self, store: bool) -> Self {
        self.store_event_info = store;
        self
    }

    pub fn with_track_tree(mut self, produce: bool) -> Self {
        self.produce_jet_track_tree = produce;
        self
    }

    pub fn with_pf_lepton_tree(mut self, produce: bool) -> Self {
        self.produce_jet_pf_lepton_tree = produce;
        self
    }

    pub fn with_muon_info(mut self, store: bool) -> Self {
        self.store_muon_info = store;
        self
    }

    pub fn with_tag_variables(mut self, store: bool) -> Self {
        self.store_tag_variables = store;
        self
    }

    pub fn with_csv_tag_variables(mut self, store: bool) -> Self {
        self.store_csv_tag_variables = store;
        self
    }

    /// Replace the trigger pattern list.
    pub fn with_trigger_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.trigger_path_names = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Append a discriminator column.
    pub fn with_discriminant(mut self, label: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.discriminants.insert(label.into(), identifier.into());
        self
    }

    pub fn with_vertex_representation(mut self, representation: VertexRepresentation) -> Self {
        self.vertex_representation = representation;
        self
    }

    pub fn with_match_coordinate(mut self, coordinate: MatchCoordinate) -> Self {
        self.groomed_match_coordinate = coordinate;
        self
    }

    pub fn with_energy_ratio_scope(mut self, scope: EnergyRatioScope) -> Self {
        self.energy_ratio_scope = scope;
        self
    }

    /// Bound every flat column to `capacity` entries per collection.
    pub fn with_layout_capacity(mut self, capacity: usize) -> Self {
        self.layout_capacity = Some(capacity);
        self
    }

    /// Enable/disable warning logs.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_warnings = log;
        self
    }

    /// Association strategy for secondary vertices.
    pub fn sv_association(&self) -> AssociationStrategy {
        self.vertex_representation.association_strategy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.min_jet_pt.is_finite() || self.min_jet_pt < 0.0 {
            return Err(NtupleError::InvalidConfig(format!(
                "min_jet_pt must be a non-negative number, got {}",
                self.min_jet_pt
            )));
        }
        if self.max_jet_eta.is_nan() || self.max_jet_eta < 0.0 {
            return Err(NtupleError::InvalidConfig(format!(
                "max_jet_eta must be non-negative, got {}",
                self.max_jet_eta
            )));
        }
        if self.layout_capacity == Some(0) {
            return Err(NtupleError::InvalidConfig(
                "layout_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(empty) = self.trigger_path_names.iter().position(String::is_empty) {
            return Err(NtupleError::InvalidConfig(format!(
                "trigger pattern {empty} is empty"
            )));
        }
        for (label, identifier) in &self.discriminants {
            if label.is_empty() || identifier.is_empty() {
                return Err(NtupleError::InvalidConfig(format!(
                    "discriminant '{label}' -> '{identifier}' has an empty name"
                )));
            }
        }
        if self.store_csv_tag_variables && !self.produce_jet_track_tree {
            log::warn!("CSV tag variables requested without the track tree");
        }
        Ok(())
    }

    /// Save to JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file. Missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = NtuplizerConfig::default()
            .with_subjets(true)
            .without_jet_skipping()
            .with_discriminant("Jet_CombSvx", "combinedSecondaryVertexBJetTags")
            .with_discriminant("Jet_Proba", "jetProbabilityBJetTags")
            .with_layout_capacity(1000);

        assert!(config.run_subjets);
        assert!(!config.allow_jet_skipping);
        assert_eq!(
            config.discriminants.keys().collect::<Vec<_>>(),
            vec!["Jet_CombSvx", "Jet_Proba"]
        );
        assert_eq!(config.layout_capacity, Some(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_vertex_representation_selects_strategy() {
        assert_eq!(
            NtuplizerConfig::default().sv_association(),
            AssociationStrategy::MaxWeight
        );
        let composite =
            NtuplizerConfig::default().with_vertex_representation(VertexRepresentation::Composite);
        assert_eq!(composite.sv_association(), AssociationStrategy::FirstContaining);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = NtuplizerConfig {
            min_jet_pt: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(NtupleError::InvalidConfig(_))));

        let config = NtuplizerConfig {
            layout_capacity: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = NtuplizerConfig::default().with_trigger_paths(["HLT_*", ""]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let path = std::env::temp_dir().join(format!("ntuplizer_config_{}.json", std::process::id()));
        let config = NtuplizerConfig::default()
            .with_trigger_paths(["HLT_Mu*"])
            .with_energy_ratio_scope(EnergyRatioScope::Jet);
        config.save_json(&path).unwrap();
        let loaded = NtuplizerConfig::load_json(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);

        let partial: NtuplizerConfig =
            serde_json::from_str(r#"{"run_subjets": true, "vertex_representation": "composite"}"#)
                .unwrap();
        assert!(partial.run_subjets);
        assert_eq!(partial.vertex_representation, VertexRepresentation::Composite);
        assert_eq!(partial.min_jet_pt, 30.0);
    }
}
