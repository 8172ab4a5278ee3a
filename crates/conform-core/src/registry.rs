//! Case registry: the immutable table of test cases and model bindings.
//!
//! The registry is a TOML document with `[[model]]` and `[[case]]` arrays:
//!
//! ```toml
//! [[model]]
//! name = "libvpx"
//! adapter = "libvpx"
//! executable = "vpxdec"
//! codecs = ["vp8", "vp9"]
//! actions = ["decode", "digest", "compare"]
//!
//! [[case]]
//! case = "libvpx-vp8-digest"
//! model = "libvpx"
//! codec = "vp8"
//! action = "digest"
//! stdout = "logs/vp8-libvpx.log"
//! srcdir = "streams/vp8"
//! outdir = "out/vp8"
//! includes = ["*.ivf"]
//! ```
//!
//! Relative paths are resolved against the directory holding the registry
//! file. Cases naming a model that is not declared load fine; the case
//! runner reports them as `UnboundModel`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::domain::{Action, ConformError, Model, RegistryError, Result, TestCase};

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "model")]
    models: Vec<Model>,

    #[serde(default, rename = "case")]
    cases: Vec<TestCase>,
}

/// Loaded once per run and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct CaseRegistry {
    models: BTreeMap<String, Model>,
    cases: Vec<TestCase>,
}

impl CaseRegistry {
    /// Build a registry from already-parsed entries. Cases keep their order.
    pub fn new(
        models: Vec<Model>,
        cases: Vec<TestCase>,
    ) -> std::result::Result<Self, RegistryError> {
        let mut by_name = BTreeMap::new();
        for model in models {
            model.validate()?;
            if by_name.contains_key(&model.name) {
                return Err(RegistryError::DuplicateModel(model.name));
            }
            by_name.insert(model.name.clone(), model);
        }

        let mut seen = HashSet::new();
        for case in &cases {
            if !seen.insert(case.name.as_str()) {
                return Err(RegistryError::DuplicateCase(case.name.clone()));
            }
        }

        Ok(Self {
            models: by_name,
            cases,
        })
    }

    /// Parse a registry document, resolving relative paths against `base_dir`.
    pub fn from_toml_str(
        content: &str,
        base_dir: &Path,
    ) -> std::result::Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(content)?;

        let models = file
            .models
            .into_iter()
            .map(|mut m| {
                m.resolve_paths(base_dir);
                m
            })
            .collect();
        let cases = file
            .cases
            .into_iter()
            .map(|mut c| {
                c.resolve_paths(base_dir);
                c
            })
            .collect();

        Self::new(models, cases)
    }

    /// Load a registry file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let registry = Self::from_toml_str(&content, base_dir)?;
        debug!(
            registry = %path.display(),
            models = registry.models.len(),
            cases = registry.cases.len(),
            "loaded case registry"
        );
        Ok(registry)
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    pub fn case(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// The model `case` is bound to, or `UnboundModel`.
    pub fn bind(&self, case: &TestCase) -> Result<&Model> {
        self.model_for(case, &case.model)
    }

    /// Look up `model` on behalf of `case`, or `UnboundModel`.
    pub fn model_for(&self, case: &TestCase, model: &str) -> Result<&Model> {
        self.models
            .get(model)
            .ok_or_else(|| ConformError::UnboundModel {
                case: case.name.clone(),
                model: model.to_string(),
            })
    }

    /// Cases matching `filter`, in registry order.
    pub fn select(&self, filter: &CaseFilter) -> Vec<&TestCase> {
        self.cases.iter().filter(|c| filter.matches(c)).collect()
    }
}

/// Case selection by name and by model/codec/action.
///
/// All set criteria must hold. An empty name list selects every name.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub names: Vec<String>,
    pub model: Option<String>,
    pub codec: Option<String>,
    pub action: Option<Action>,
}

impl CaseFilter {
    pub fn matches(&self, case: &TestCase) -> bool {
        (self.names.is_empty() || self.names.iter().any(|n| *n == case.name))
            && self.model.as_ref().map_or(true, |m| *m == case.model)
            && self.codec.as_ref().map_or(true, |c| *c == case.codec)
            && self.action.map_or(true, |a| a == case.action)
    }
}
