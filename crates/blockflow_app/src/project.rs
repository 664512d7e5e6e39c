// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project settings and configuration.
//!
//! A project file (RON) carries:
//! - Project metadata (name, version, author)
//! - Extra block templates and the palette inventory
//! - Placement of the pinned input and output blocks
//! - Flow settings (interaction, traversal, pipe geometry)
//! - Simulation clock settings
//! - The scenario script to run

use crate::script::ScriptStep;
use blockflow_graph::{BlockRegistry, BlockTemplate, FlowSettings, Point, Session, SessionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current project settings format version
pub const PROJECT_FORMAT_VERSION: u32 = 1;

/// Project settings file name
pub const PROJECT_FILE_NAME: &str = "project.blockflow";

/// Project metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Project name
    pub name: String,
    /// Project version (semantic versioning)
    pub version: String,
    /// Author name
    #[serde(default)]
    pub author: String,
    /// Project description
    #[serde(default)]
    pub description: String,
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            name: "Untitled Flow".to_string(),
            version: "0.1.0".to_string(),
            author: String::new(),
            description: String::new(),
        }
    }
}

/// Where the pinned blocks sit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Input block position
    pub input_position: Point,
    /// Output block position
    pub output_position: Point,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            input_position: [100.0, 300.0],
            output_position: [900.0, 300.0],
        }
    }
}

/// Simulation clock settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Fixed timestep in seconds
    pub fixed_timestep: f64,
    /// Time scale (1.0 = normal speed)
    pub time_scale: f32,
    /// Simulated seconds to wait for tokens after the script ends
    pub settle_timeout: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            time_scale: 1.0,
            settle_timeout: 30.0,
        }
    }
}

/// Complete project settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Settings format version
    pub version: u32,
    /// Project metadata
    pub metadata: ProjectMetadata,
    /// Templates registered on top of the built-ins
    #[serde(default)]
    pub templates: Vec<BlockTemplate>,
    /// Template IDs stocked in the palette, in order
    #[serde(default)]
    pub palette: Vec<String>,
    /// Pinned block placement
    #[serde(default)]
    pub layout: LayoutSettings,
    /// Flow settings
    #[serde(default)]
    pub flow: FlowSettings,
    /// Clock settings
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Scenario to run
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            version: PROJECT_FORMAT_VERSION,
            metadata: ProjectMetadata::default(),
            templates: Vec::new(),
            palette: vec!["add".to_string(), "multiply".to_string()],
            layout: LayoutSettings::default(),
            flow: FlowSettings::default(),
            simulation: SimulationSettings::default(),
            script: ScriptStep::demo(),
        }
    }
}

impl ProjectSettings {
    /// Create new project settings with the given name
    pub fn new(name: impl Into<String>) -> Self {
        let mut settings = Self::default();
        settings.metadata.name = name.into();
        settings
    }

    /// Parse project settings from RON
    pub fn from_ron(content: &str) -> Result<Self, ProjectError> {
        let settings: ProjectSettings = ron::from_str(content)?;

        // Version check
        if settings.version > PROJECT_FORMAT_VERSION {
            return Err(ProjectError::UnsupportedVersion {
                found: settings.version,
                supported: PROJECT_FORMAT_VERSION,
            });
        }

        Ok(settings)
    }

    /// Serialize project settings to pretty RON
    pub fn to_ron(&self) -> Result<String, ProjectError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load project settings from a file
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_ron(&content)?;
        tracing::info!(path = %path.display(), name = %settings.metadata.name, "loaded project");
        Ok(settings)
    }

    /// Save project settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        std::fs::write(path, self.to_ron()?)?;
        tracing::info!(path = %path.display(), "saved project");
        Ok(())
    }

    /// Get the project file path for a project directory
    pub fn project_file_path(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_FILE_NAME)
    }

    /// Template registry: built-ins plus the project's templates
    pub fn registry(&self) -> BlockRegistry {
        let mut registry = BlockRegistry::with_builtins();
        for template in &self.templates {
            registry.register(template.clone());
        }
        registry
    }

    /// Build a bootstrapped session with the palette stocked
    pub fn build_session(&self) -> Result<Session, SessionError> {
        let mut session = Session::new(self.registry(), self.flow);
        session.bootstrap(self.layout.input_position, self.layout.output_position)?;
        session.stock_palette(self.palette.as_slice())?;
        Ok(session)
    }
}

/// Error loading or saving a project
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid project RON
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// File was written by a newer format
    #[error("Project version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },
}
