//! Named string settings that value requests target

use std::collections::HashMap;

use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::event::ValueRequest;

bitflags! {
    /// How a setting's value should be prompted for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SettingFlags: u32 {
        /// The value is a file path
        const IS_FILENAME = 0b0001;
        /// The path is written rather than read
        const SAVE_FILE_DIALOG = 0b0010;
    }
}

/// A single string setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringSetting {
    /// Identifier, e.g. `boot-device`
    pub name: String,
    /// Current value
    pub value: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Prompt shown when asking for a new value
    pub ask_prompt: Option<String>,
    /// Path flags
    pub flags: SettingFlags,
}

impl StringSetting {
    /// Create a plain text setting
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
            ask_prompt: None,
            flags: SettingFlags::empty(),
        }
    }

    /// Create a setting holding a path to an existing file
    pub fn path(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value).with_flags(SettingFlags::IS_FILENAME)
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the ask prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.ask_prompt = Some(prompt.into());
        self
    }

    /// Set the flags
    pub fn with_flags(mut self, flags: SettingFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Prompt text, falling back to the description and then the name
    pub fn prompt(&self) -> &str {
        self.ask_prompt
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or(&self.name)
    }

    /// Build a value request payload for this setting
    pub fn to_request(&self) -> ValueRequest {
        ValueRequest::new(&self.name, &self.value)
            .with_flags(self.flags)
            .with_prompt(self.prompt())
    }
}

/// Thread-safe registry of string settings
#[derive(Debug, Default)]
pub struct Settings {
    entries: RwLock<HashMap<String, StringSetting>>,
}

impl Settings {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a setting
    pub fn register(&self, setting: StringSetting) {
        debug!(setting = %setting.name, "Registering setting");
        self.entries.write().insert(setting.name.clone(), setting);
    }

    /// Snapshot of a setting
    pub fn get(&self, name: &str) -> Option<StringSetting> {
        self.entries.read().get(name).cloned()
    }

    /// Current value of a setting
    pub fn value(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).map(|s| s.value.clone())
    }

    /// Check if a setting exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Change the value of an existing setting
    pub fn set(&self, name: &str, value: impl Into<String>) -> RelayResult<()> {
        let mut entries = self.entries.write();
        let setting = entries
            .get_mut(name)
            .ok_or_else(|| RelayError::UnknownSetting(name.to_string()))?;
        setting.value = value.into();
        debug!(setting = %name, value = %setting.value, "Setting changed");
        Ok(())
    }

    /// Sorted list of setting names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}
