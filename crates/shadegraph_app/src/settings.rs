// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace settings stored next to the graph.

use serde::{Deserialize, Serialize};
use shadegraph_graph::Dialect;
use std::path::{Path, PathBuf};

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "shadegraph.ron";

/// Files the host reads and writes. Relative paths resolve against the
/// directory holding the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Saved graph
    pub graph: PathBuf,
    /// Generated vertex program
    pub vertex: PathBuf,
    /// Generated fragment program
    pub fragment: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            graph: PathBuf::from("graph.sg"),
            vertex: PathBuf::from("shader.vert"),
            fragment: PathBuf::from("shader.frag"),
        }
    }
}

/// Complete workspace settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadegraphSettings {
    /// Settings format version
    pub version: u32,
    /// Target GLSL dialect
    #[serde(default)]
    pub dialect: Dialect,
    /// File locations
    #[serde(default)]
    pub paths: PathSettings,
}

impl Default for ShadegraphSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            dialect: Dialect::default(),
            paths: PathSettings::default(),
        }
    }
}

fn invalid_data(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.into())
}

impl ShadegraphSettings {
    /// Read a workspace's settings. Files written by a newer format are
    /// refused rather than half-read.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = ron::from_str(&text)
            .map_err(|e| invalid_data(format!("{}: {e}", path.display())))?;
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(invalid_data(format!(
                "{} uses settings format {}, this shadegraph reads up to {}",
                path.display(),
                settings.version,
                SETTINGS_FORMAT_VERSION
            )));
        }
        tracing::debug!("Targeting {} from {}", settings.dialect, path.display());
        Ok(settings)
    }

    /// Write the settings as named RON so the file is hand-editable.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(|e| invalid_data(e.to_string()))?;
        std::fs::write(path, text)
    }

    /// Resolve the configured paths against the settings file's directory
    pub fn resolved(&self, settings_path: &Path) -> PathSettings {
        let base = settings_path.parent().unwrap_or_else(|| Path::new(""));
        PathSettings {
            graph: base.join(&self.paths.graph),
            vertex: base.join(&self.paths.vertex),
            fragment: base.join(&self.paths.fragment),
        }
    }
}
