//! Configuration schema definitions

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,
}

impl ConfigSchema {
    /// Check identifiers and group wiring
    pub fn validate(&self) -> Result<()> {
        self.registration.validate()
    }
}

/// Project location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Path to the project descriptor, relative to the working directory
    #[serde(default = "default_pbxproj")]
    pub pbxproj: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            pbxproj: default_pbxproj(),
        }
    }
}

fn default_pbxproj() -> String {
    "DownloaderApp.xcodeproj/project.pbxproj".to_string()
}

/// An existing object in the project, named by identifier and comment label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub id: String,
    pub label: String,
}

impl AnchorConfig {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

/// One source file to register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name as shown in Xcode
    pub name: String,
    /// Path relative to the directory holding the .xcodeproj
    pub path: String,
    /// Label of the group the file belongs to
    pub group: String,
}

/// A group created by the registration
///
/// Omitted fields fall back to the Series group under Views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewGroupConfig {
    /// Set to false to register into existing groups only
    pub enabled: bool,
    pub name: String,
    pub path: String,
    /// Existing sibling group the new block is written in front of
    pub before: AnchorConfig,
    /// Existing group that receives a reference to the new group
    pub parent: AnchorConfig,
    /// Child of `parent` after which the reference goes; list head when absent
    pub after: Option<AnchorConfig>,
}

impl Default for NewGroupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "Series".to_string(),
            path: "Series".to_string(),
            before: AnchorConfig::new("8748C644739E273BB62F4CD4", "Movies"),
            parent: AnchorConfig::new("9B349A59D9A8626A27783AC7", "Views"),
            after: Some(AnchorConfig::new("8748C644739E273BB62F4CD4", "Movies")),
        }
    }
}

/// What to register and where
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_files")]
    pub files: Vec<FileEntry>,

    /// `lastKnownFileType` override; derived from the extension when unset
    #[serde(default)]
    pub file_type: Option<String>,

    #[serde(default = "default_groups")]
    pub groups: Vec<AnchorConfig>,

    #[serde(default = "default_new_group")]
    pub new_group: Option<NewGroupConfig>,

    #[serde(default = "default_phase")]
    pub phase: AnchorConfig,

    /// Leave out files whose reference is already in the project
    #[serde(default)]
    pub skip_existing: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            files: default_files(),
            file_type: None,
            groups: default_groups(),
            new_group: default_new_group(),
            phase: default_phase(),
            skip_existing: false,
        }
    }
}

impl RegistrationConfig {
    /// The group to create, unless absent or switched off
    pub fn active_new_group(&self) -> Option<&NewGroupConfig> {
        self.new_group.as_ref().filter(|g| g.enabled)
    }

    fn validate(&self) -> Result<()> {
        let mut anchors: Vec<&AnchorConfig> = self.groups.iter().collect();
        anchors.push(&self.phase);
        if let Some(group) = self.active_new_group() {
            anchors.push(&group.before);
            anchors.push(&group.parent);
            anchors.extend(group.after.as_ref());
        }
        for anchor in anchors {
            if !is_object_id(&anchor.id) {
                return Err(Error::config_invalid(format!(
                    "Invalid object identifier '{}' for '{}'",
                    anchor.id, anchor.label
                ))
                .with_suggestion("Identifiers are 24 uppercase hexadecimal characters"));
            }
        }

        for file in &self.files {
            if file.name.trim().is_empty() {
                return Err(Error::config_invalid(format!("File entry with path '{}' has no name", file.path)));
            }
            let known_group = self.groups.iter().any(|g| g.label == file.group)
                || self.active_new_group().is_some_and(|g| g.name == file.group);
            if !known_group {
                return Err(Error::config_invalid(format!(
                    "File '{}' targets unknown group '{}'",
                    file.name, file.group
                ))
                .with_suggestion("Add the group under [[registration.groups]] or [registration.new_group]"));
            }
        }

        Ok(())
    }
}

/// True for a 24-character uppercase hexadecimal object identifier
pub fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F'))
}

fn default_files() -> Vec<FileEntry> {
    [
        ("Series.swift", "DownloaderApp/Models/Series.swift", "Models"),
        ("SeriesService.swift", "DownloaderApp/Services/SeriesService.swift", "Services"),
        ("SeriesViewModel.swift", "DownloaderApp/ViewModels/SeriesViewModel.swift", "ViewModels"),
        ("SeriesSearchView.swift", "DownloaderApp/Views/Series/SeriesSearchView.swift", "Series"),
        ("SeriesDetailView.swift", "DownloaderApp/Views/Series/SeriesDetailView.swift", "Series"),
    ]
    .into_iter()
    .map(|(name, path, group)| FileEntry {
        name: name.to_string(),
        path: path.to_string(),
        group: group.to_string(),
    })
    .collect()
}

fn default_groups() -> Vec<AnchorConfig> {
    vec![
        AnchorConfig::new("89178667549452CF16F0DABF", "Models"),
        AnchorConfig::new("F8D9F194C6E8D952D1E11C35", "Services"),
        AnchorConfig::new("932AD4F5AE6B9226D18E7611", "ViewModels"),
    ]
}

fn default_new_group() -> Option<NewGroupConfig> {
    Some(NewGroupConfig::default())
}

fn default_phase() -> AnchorConfig {
    AnchorConfig::new("FA5D87D555F7D17824329C20", "Sources")
}
