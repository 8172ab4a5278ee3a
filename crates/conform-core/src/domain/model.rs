//! Decoder model bindings.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::case::Action;
use crate::domain::error::{ConformError, RegistryError, Result};

/// Decoder family; selects the adapter that builds invocations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// libvpx `vpxdec`.
    Libvpx,

    /// `ffmpeg` command-line decoder.
    Ffmpeg,

    /// JM reference decoder family, driven through a parameter file.
    Jm,

    /// Fully data-driven argument template.
    Template,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Libvpx => "libvpx",
            AdapterKind::Ffmpeg => "ffmpeg",
            AdapterKind::Jm => "jm",
            AdapterKind::Template => "template",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoder binding resolved by model name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Model {
    pub name: String,

    pub adapter: AdapterKind,

    /// Decoder executable. Bare names are looked up on `PATH`.
    #[serde(rename = "executable")]
    pub executable_path: PathBuf,

    #[serde(rename = "codecs")]
    pub supported_codecs: BTreeSet<String>,

    #[serde(rename = "actions")]
    pub supported_actions: BTreeSet<Action>,

    /// Adapter-specific parameter file template (JM family).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_template: Option<String>,

    /// Argument template (template adapter).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Appended verbatim to the adapter's own arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Model {
    /// Whether this model declares support for `codec` with `action`.
    pub fn supports(&self, codec: &str, action: Action) -> bool {
        self.supported_codecs.contains(codec) && self.supported_actions.contains(&action)
    }

    /// Fail with `UnsupportedCombination` unless [`Model::supports`] holds.
    pub fn check_support(&self, codec: &str, action: Action) -> Result<()> {
        if self.supports(codec, action) {
            Ok(())
        } else {
            Err(ConformError::UnsupportedCombination {
                model: self.name.clone(),
                codec: codec.to_string(),
                action,
            })
        }
    }

    /// Binding checks that do not depend on the host.
    pub(crate) fn validate(&self) -> std::result::Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidModel {
            model: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.executable_path.as_os_str().is_empty() {
            return Err(invalid("executable is empty"));
        }
        if self.supported_codecs.is_empty() {
            return Err(invalid("no codecs declared"));
        }
        if self.supported_actions.is_empty() {
            return Err(invalid("no actions declared"));
        }
        match self.adapter {
            AdapterKind::Jm if self.config_template.is_none() => {
                Err(invalid("jm adapter requires config_template"))
            }
            AdapterKind::Template if self.args.is_empty() => {
                Err(invalid("template adapter requires args"))
            }
            _ => Ok(()),
        }
    }

    /// Resolve relative executable paths (those naming a directory) against `base`.
    pub(crate) fn resolve_paths(&mut self, base: &Path) {
        let has_dir = self.executable_path.components().count() > 1;
        if has_dir && self.executable_path.is_relative() {
            self.executable_path = base.join(&self.executable_path);
        }
    }

    /// Locate the executable on disk, searching `PATH` for bare names.
    pub fn resolve_executable(&self) -> Result<PathBuf> {
        let missing = || ConformError::MissingExecutable {
            model: self.name.clone(),
            path: self.executable_path.clone(),
        };

        if self.executable_path.components().count() > 1 {
            return if self.executable_path.is_file() {
                Ok(self.executable_path.clone())
            } else {
                Err(missing())
            };
        }

        let path_var = std::env::var_os("PATH").ok_or_else(missing)?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.executable_path))
            .find(|candidate| candidate.is_file())
            .ok_or_else(missing)
    }
}
