//! Settings resolution: preset ids and encoded payloads to [`Settings`].
//!
//! [`PresetStore`] is the read-only catalog of named presets. The built-in
//! catalog is `presets.yaml`, compiled into the binary; a deployment may
//! point `session.presets_file` at its own. [`SettingsResolver`] wraps the
//! store and also decodes settings sent directly in a start request.
//!
//! An unknown preset is always an error. There is no silent fallback to
//! the default preset.

use std::collections::BTreeMap;
use std::path::Path;

use dynstack_core::settings::{self, SettingsViolation};
use dynstack_types::Settings;
use serde::Deserialize;
use tracing::info;

/// Id of the preset used when none is named.
pub const DEFAULT_PRESET: &str = "baseline";

/// The catalog shipped with the host.
const BUILTIN_PRESETS: &str = include_str!("../presets.yaml");

/// Errors raised while loading a preset catalog.
#[derive(Debug, thiserror::Error)]
pub enum PresetStoreError {
    /// Failed to read the catalog file.
    #[error("failed to read preset file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The catalog is not valid YAML for the settings schema.
    #[error("failed to parse preset YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A preset describes a yard that cannot run.
    #[error("preset {preset} is invalid: {source}")]
    Invalid {
        /// The offending preset id.
        preset: String,
        /// What is wrong with it.
        source: SettingsViolation,
    },
}

impl From<serde_yml::Error> for PresetStoreError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Errors raised while resolving or decoding settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No preset with this id exists.
    #[error("unknown settings preset: {preset}")]
    PresetNotFound {
        /// The requested id.
        preset: String,
    },

    /// The payload is not an encoded [`Settings`] value.
    #[error("failed to decode settings: {source}")]
    Decode {
        /// The underlying decode error.
        #[from]
        source: serde_json::Error,
    },

    /// The decoded settings cannot be simulated.
    #[error("invalid settings: {source}")]
    Invalid {
        /// What is wrong with them.
        #[from]
        source: SettingsViolation,
    },
}

#[derive(Debug, Deserialize)]
struct PresetFile {
    presets: BTreeMap<String, Settings>,
}

/// Read-only catalog of named presets.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetStore {
    presets: BTreeMap<String, Settings>,
}

impl PresetStore {
    /// The catalog compiled into the host.
    ///
    /// # Errors
    ///
    /// Returns [`PresetStoreError`] if the embedded catalog is broken.
    pub fn builtin() -> Result<Self, PresetStoreError> {
        Self::from_yaml_str(BUILTIN_PRESETS)
    }

    /// Load a catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`PresetStoreError`] if the file cannot be read, parsed, or
    /// contains an invalid preset.
    pub fn from_file(path: &Path) -> Result<Self, PresetStoreError> {
        let contents = std::fs::read_to_string(path)?;
        let store = Self::from_yaml_str(&contents)?;
        info!(path = %path.display(), presets = store.len(), "Preset catalog loaded");
        Ok(store)
    }

    /// Parse a catalog of the form `presets: { <id>: <settings>, ... }`.
    ///
    /// # Errors
    ///
    /// Returns [`PresetStoreError`] if the YAML is malformed or a preset
    /// fails validation.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PresetStoreError> {
        let file: PresetFile = serde_yml::from_str(yaml)?;
        for (preset, settings) in &file.presets {
            settings::validate(settings).map_err(|source| PresetStoreError::Invalid {
                preset: preset.clone(),
                source,
            })?;
        }
        Ok(Self {
            presets: file.presets,
        })
    }

    /// Look up a preset.
    pub fn get(&self, preset: &str) -> Option<&Settings> {
        self.presets.get(preset)
    }

    /// All preset ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// Number of presets in the catalog.
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// Maps preset ids and encoded payloads to validated [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    store: PresetStore,
}

impl SettingsResolver {
    /// Create a resolver over `store`.
    pub const fn new(store: PresetStore) -> Self {
        Self { store }
    }

    /// The underlying catalog.
    pub const fn store(&self) -> &PresetStore {
        &self.store
    }

    /// Resolve a preset id.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::PresetNotFound`] for unknown ids.
    pub fn resolve(&self, preset: &str) -> Result<Settings, SettingsError> {
        self.store
            .get(preset)
            .cloned()
            .ok_or_else(|| SettingsError::PresetNotFound {
                preset: preset.to_owned(),
            })
    }

    /// Resolve [`DEFAULT_PRESET`].
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::PresetNotFound`] if the catalog lacks it.
    pub fn default_preset(&self) -> Result<Settings, SettingsError> {
        self.resolve(DEFAULT_PRESET)
    }

    /// Encoded settings for a preset id.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::PresetNotFound`] for unknown ids.
    pub fn default_settings(&self, preset: &str) -> Result<Vec<u8>, SettingsError> {
        Self::encode(&self.resolve(preset)?)
    }

    /// Decode and validate an encoded settings payload.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Decode`] for malformed payloads and
    /// [`SettingsError::Invalid`] for settings that fail validation.
    pub fn decode(bytes: &[u8]) -> Result<Settings, SettingsError> {
        let settings: Settings = serde_json::from_slice(bytes)?;
        settings::validate(&settings)?;
        Ok(settings)
    }

    /// Encode settings for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Decode`] if serialization fails.
    pub fn encode(settings: &Settings) -> Result<Vec<u8>, SettingsError> {
        Ok(serde_json::to_vec(settings)?)
    }
}
