//! Injected lookups for values the projector copies but never computes.
//!
//! Discriminators are configured by string identifier. Identifiers are
//! resolved once, when the projector is built, into index-capturing
//! accessors; per-event work is a plain function call per jet. An identifier
//! the provider does not know resolves to nothing: a warning is recorded at
//! setup and the column is filled with [`MISSING_VALUE`] for every jet.
//!
//! Tag variables are looked up per jet and per source (track IP, secondary
//! vertex, combined computer) through [`TagVariableProvider`]. The default
//! [`EmbeddedTagVariables`] reads the lists attached to the jet's tag infos.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::tagging::{TagVariableSource, TaggingVariableList};
use crate::types::{Jet, MISSING_VALUE};
use crate::warnings::{WarningCategory, WarningTracker};

/// Reads one discriminator value from a jet.
pub type DiscriminantAccessor = Arc<dyn Fn(&Jet) -> f32 + Send + Sync>;

/// Resolves discriminator identifiers to accessors.
pub trait DiscriminantProvider {
    /// Accessor for `identifier`, or `None` if the provider does not know it.
    fn resolve(&self, identifier: &str) -> Option<DiscriminantAccessor>;
}

/// Names of the discriminators carried positionally in [`Jet::discriminants`].
///
/// Position `i` in the catalog names `jet.discriminants[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscriminantCatalog {
    names: IndexSet<String>,
}

impl DiscriminantCatalog {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.get_index_of(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl DiscriminantProvider for DiscriminantCatalog {
    fn resolve(&self, identifier: &str) -> Option<DiscriminantAccessor> {
        let index = self.position(identifier)?;
        Some(Arc::new(move |jet: &Jet| {
            jet.discriminants.get(index).copied().unwrap_or(MISSING_VALUE)
        }))
    }
}

/// Configured discriminators bound to accessors, in output order.
#[derive(Clone, Default)]
pub struct ResolvedDiscriminants {
    labels: Vec<String>,
    accessors: Vec<Option<DiscriminantAccessor>>,
}

impl ResolvedDiscriminants {
    /// Bind every `label -> identifier` entry of `requested` through `provider`.
    pub fn resolve(
        requested: &IndexMap<String, String>,
        provider: &dyn DiscriminantProvider,
        warnings: &mut WarningTracker,
    ) -> Self {
        let mut labels = Vec::with_capacity(requested.len());
        let mut accessors = Vec::with_capacity(requested.len());

        for (label, identifier) in requested {
            let accessor = provider.resolve(identifier);
            if accessor.is_none() {
                warnings.record_simple(
                    WarningCategory::MissingDiscriminant,
                    format!("discriminator '{identifier}' for column '{label}' is not provided; filling {MISSING_VALUE}"),
                );
            }
            labels.push(label.clone());
            accessors.push(accessor);
        }

        log::debug!(
            "Resolved {}/{} discriminators",
            accessors.iter().filter(|a| a.is_some()).count(),
            accessors.len()
        );

        Self { labels, accessors }
    }

    /// Output column labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of labels bound to a real accessor.
    pub fn n_resolved(&self) -> usize {
        self.accessors.iter().filter(|a| a.is_some()).count()
    }

    /// All configured values for `jet`, in label order.
    pub fn evaluate(&self, jet: &Jet) -> Vec<f32> {
        self.accessors
            .iter()
            .map(|accessor| accessor.as_ref().map_or(MISSING_VALUE, |f| f(jet)))
            .collect()
    }
}

impl fmt::Debug for ResolvedDiscriminants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedDiscriminants")
            .field("labels", &self.labels)
            .field("resolved", &self.n_resolved())
            .finish()
    }
}

/// Supplies tagging-variable lists for a jet.
pub trait TagVariableProvider: Send + Sync {
    fn variables<'a>(&self, jet: &'a Jet, source: TagVariableSource)
        -> Option<&'a TaggingVariableList>;
}

/// Reads the variable lists embedded in the jet's own tag infos.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedTagVariables;

impl TagVariableProvider for EmbeddedTagVariables {
    fn variables<'a>(
        &self,
        jet: &'a Jet,
        source: TagVariableSource,
    ) -> Option<&'a TaggingVariableList> {
        match source {
            TagVariableSource::TrackIp => jet.ip_info.as_ref().map(|ip| &ip.variables),
            TagVariableSource::SecondaryVertex => jet.sv_info.as_ref().map(|sv| &sv.variables),
            TagVariableSource::Combined => jet.csv_variables.as_ref(),
        }
    }
}
