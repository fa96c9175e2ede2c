//! Persisted user settings.
//!
//! Stored as JSON in `<config dir>/hotkey-portal/settings.json`.

use crate::accelerator::Accelerator;
use crate::error::Result;
use global_hotkey::hotkey::Modifiers;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hotkey used until the user picks another one. Stored in its normalized
/// form, `Shift+Super+R`.
pub const DEFAULT_HOTKEY: &str = "Super+Shift+R";

const APP_DIR: &str = "hotkey-portal";
const FILE_NAME: &str = "settings.json";

/// Location of the settings file, if the platform has a config directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Accelerator for the native registration path
    pub hotkey: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hotkey: SettingsStore::default_hotkey().to_string(),
        }
    }
}

/// Settings bound to the file they are saved in.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            debug!("No settings at {}, using defaults", path.display());
            Settings::default()
        };
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The stored hotkey, or the default if the stored value does not parse.
    pub fn hotkey(&self) -> Accelerator {
        match Accelerator::parse(&self.settings.hotkey) {
            Ok(accelerator) => accelerator,
            Err(e) => {
                warn!(
                    "Ignoring stored hotkey {:?}: {}",
                    self.settings.hotkey, e
                );
                Self::default_hotkey()
            }
        }
    }

    /// Store `accelerator` in normalized form and save.
    pub fn set_hotkey(&mut self, accelerator: &Accelerator) -> Result<()> {
        self.settings.hotkey = accelerator.to_string();
        self.save()
    }

    pub fn reset_hotkey(&mut self) -> Result<()> {
        self.settings.hotkey = Self::default_hotkey().to_string();
        self.save()
    }

    pub fn is_default_hotkey(&self) -> bool {
        self.hotkey() == Self::default_hotkey()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, content)?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }

    fn default_hotkey() -> Accelerator {
        Accelerator::from_parts(Modifiers::SHIFT | Modifiers::SUPER, "R")
    }
}
