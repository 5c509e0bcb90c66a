//! Xcode project file inspection
//!
//! A read-only view over `.xcodeproj/project.pbxproj`. Objects are picked out
//! with regular expressions rather than a full grammar parser: file
//! references, build files, groups and source build phases are enough to
//! answer "is this file registered" and "is the project consistent".

use downloader_core::error::{Error, Result, ResultExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

static FILE_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9A-F]{24})(?: /\*[^*]*\*/)? = \{isa = PBXFileReference;([^}]*)\}").unwrap()
});

static BUILD_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9A-F]{24})(?: /\*[^*]*\*/)? = \{isa = PBXBuildFile; fileRef = ([0-9A-F]{24})")
        .unwrap()
});

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)([0-9A-F]{24})(?: /\* ([^*]*?) \*/)? = \{\s*isa = (PBXGroup|PBXVariantGroup|PBXSourcesBuildPhase);(.*?)\};",
    )
    .unwrap()
});

static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9A-F]{24})(?: /\* ([^*]*?) \*/)?,").unwrap());

static CHILDREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)children = \((.*?)\);").unwrap());

static FILES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)files = \((.*?)\);").unwrap());

static PROPERTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[\s;{])([A-Za-z_][A-Za-z0-9_]*)\s*=\s*("(?:[^"\\]|\\.)*"|[^;\s]+);"#).unwrap()
});

/// Represents an Xcode project
#[derive(Debug)]
pub struct XcodeProject {
    /// Directory containing the .xcodeproj bundle
    pub project_dir: PathBuf,
    file_refs: HashMap<String, FileReference>,
    build_files: HashMap<String, BuildFile>,
    groups: HashMap<String, Group>,
    phases: HashMap<String, SourcesPhase>,
}

/// File reference in the project
#[derive(Debug, Clone)]
pub struct FileReference {
    pub id: String,
    pub path: String,
    pub name: Option<String>,
    pub source_tree: String,
    pub file_type: Option<String>,
}

/// Build file reference
#[derive(Debug, Clone)]
pub struct BuildFile {
    pub id: String,
    pub file_ref_id: String,
}

/// Entry in a group's children or a phase's files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub id: String,
    pub comment: Option<String>,
}

/// Logical folder in the project navigator
#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub label: Option<String>,
    pub path: Option<String>,
    pub children: Vec<ListEntry>,
}

/// Compile sources build phase
#[derive(Debug, Clone)]
pub struct SourcesPhase {
    pub id: String,
    pub files: Vec<ListEntry>,
}

impl XcodeProject {
    /// Open an Xcode project bundle
    pub fn open(path: &Path) -> Result<Self> {
        let pbxproj_path = path.join("project.pbxproj");
        if !pbxproj_path.exists() {
            return Err(Error::project_not_found(&pbxproj_path));
        }

        let content = fs::read_to_string(&pbxproj_path)
            .map_err(Error::from)
            .context(format!("Reading {}", pbxproj_path.display()))?;
        let project_dir = path
            .parent()
            .ok_or_else(|| Error::invalid_project_path(path))?
            .to_path_buf();

        Ok(Self::parse(&content, project_dir))
    }

    /// Build a view over descriptor text
    pub fn parse(content: &str, project_dir: impl Into<PathBuf>) -> Self {
        let mut file_refs = HashMap::new();
        for cap in FILE_REF_RE.captures_iter(content) {
            let id = cap[1].to_string();
            let mut props = properties(&cap[2]);
            file_refs.insert(
                id.clone(),
                FileReference {
                    id,
                    path: props.remove("path").unwrap_or_default(),
                    name: props.remove("name"),
                    source_tree: props.remove("sourceTree").unwrap_or_else(|| "<group>".to_string()),
                    file_type: props
                        .remove("lastKnownFileType")
                        .or_else(|| props.remove("explicitFileType")),
                },
            );
        }

        let build_files = BUILD_FILE_RE
            .captures_iter(content)
            .map(|cap| {
                let id = cap[1].to_string();
                (
                    id.clone(),
                    BuildFile {
                        id,
                        file_ref_id: cap[2].to_string(),
                    },
                )
            })
            .collect();

        let mut groups = HashMap::new();
        let mut phases = HashMap::new();
        for cap in BLOCK_RE.captures_iter(content) {
            let id = cap[1].to_string();
            let body = &cap[4];
            if &cap[3] == "PBXSourcesBuildPhase" {
                let files = list_entries(&FILES_RE, body);
                phases.insert(id.clone(), SourcesPhase { id, files });
            } else {
                groups.insert(
                    id.clone(),
                    Group {
                        id,
                        label: cap.get(2).map(|m| m.as_str().to_string()),
                        path: properties(body).remove("path"),
                        children: list_entries(&CHILDREN_RE, body),
                    },
                );
            }
        }

        Self {
            project_dir: project_dir.into(),
            file_refs,
            build_files,
            groups,
            phases,
        }
    }

    /// Get all file references
    pub fn file_references(&self) -> impl Iterator<Item = &FileReference> {
        self.file_refs.values()
    }

    /// Find a file reference by its `path` property
    pub fn find_file_reference_by_path(&self, path: &str) -> Option<&FileReference> {
        self.file_refs.values().find(|fr| fr.path == path)
    }

    /// Look up a build file
    pub fn build_file(&self, id: &str) -> Option<&BuildFile> {
        self.build_files.get(id)
    }

    /// Look up a group
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    /// Get all groups, including variant groups
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Whether any object uses this identifier
    pub fn has_object(&self, id: &str) -> bool {
        self.file_refs.contains_key(id)
            || self.build_files.contains_key(id)
            || self.groups.contains_key(id)
            || self.phases.contains_key(id)
    }

    /// Get build files for a source build phase
    pub fn build_files_for_phase(&self, phase_id: &str) -> Vec<BuildFile> {
        self.phases
            .get(phase_id)
            .map(|phase| {
                phase
                    .files
                    .iter()
                    .filter_map(|entry| self.build_files.get(&entry.id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a `<group>`-relative file reference to a path on disk
    ///
    /// Walks up through the parent groups joining their `path` components.
    pub fn resolve_path(&self, file_ref_id: &str) -> Option<PathBuf> {
        let file_ref = self.file_refs.get(file_ref_id)?;
        if file_ref.path.is_empty() {
            return None;
        }
        match file_ref.source_tree.as_str() {
            "<absolute>" => return Some(PathBuf::from(&file_ref.path)),
            "SOURCE_ROOT" => return Some(self.project_dir.join(&file_ref.path)),
            "<group>" => {}
            _ => return None,
        }

        let parents: HashMap<&str, &Group> = self
            .groups
            .values()
            .flat_map(|g| g.children.iter().map(move |c| (c.id.as_str(), g)))
            .collect();

        let mut components = vec![file_ref.path.as_str()];
        let mut seen = HashSet::new();
        let mut current = file_ref_id;
        while let Some(group) = parents.get(current) {
            if !seen.insert(group.id.as_str()) {
                break;
            }
            if let Some(path) = &group.path {
                components.push(path);
            }
            current = &group.id;
        }

        Some(
            components
                .into_iter()
                .rev()
                .fold(self.project_dir.clone(), |acc, c| acc.join(c)),
        )
    }

    /// Find broken references (in project but file doesn't exist)
    pub fn find_broken_references(&self) -> Vec<FileReference> {
        self.file_refs
            .values()
            .filter(|fr| fr.file_type.as_deref().is_some_and(|t| t.starts_with("sourcecode")))
            .filter(|fr| self.resolve_path(&fr.id).is_some_and(|p| !p.exists()))
            .cloned()
            .collect()
    }

    /// Find file references compiled more than once in the same phase
    pub fn find_duplicate_build_files(&self) -> Vec<(String, Vec<BuildFile>)> {
        let mut duplicates = Vec::new();
        for phase_id in self.phases.keys() {
            let mut by_ref: HashMap<String, Vec<BuildFile>> = HashMap::new();
            for build_file in self.build_files_for_phase(phase_id) {
                by_ref
                    .entry(build_file.file_ref_id.clone())
                    .or_default()
                    .push(build_file);
            }
            duplicates.extend(by_ref.into_iter().filter(|(_, bfs)| bfs.len() > 1));
        }
        duplicates
    }

    /// Get project status summary
    pub fn status(&self) -> ProjectStatus {
        let broken = self.find_broken_references();
        let duplicates = self.find_duplicate_build_files();

        ProjectStatus {
            file_references: self.file_refs.len(),
            build_files: self.build_files.len(),
            groups: self.groups.len(),
            broken_references: broken.len(),
            duplicate_references: duplicates.len(),
            broken_reference_paths: broken.into_iter().map(|fr| fr.path).collect(),
        }
    }
}

/// `key = value;` pairs of an object body, first occurrence wins
fn properties(body: &str) -> HashMap<&str, String> {
    let mut props = HashMap::new();
    for cap in PROPERTY_RE.captures_iter(body) {
        let (Some(key), Some(value)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        props
            .entry(key.as_str())
            .or_insert_with(|| unquote(value.as_str()));
    }
    props
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}

fn list_entries(list_re: &Regex, body: &str) -> Vec<ListEntry> {
    list_re
        .captures(body)
        .map(|list| {
            LIST_ITEM_RE
                .captures_iter(&list[1])
                .map(|item| ListEntry {
                    id: item[1].to_string(),
                    comment: item.get(2).map(|m| m.as_str().to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Project status summary
#[derive(Debug)]
pub struct ProjectStatus {
    pub file_references: usize,
    pub build_files: usize,
    pub groups: usize,
    pub broken_references: usize,
    pub duplicate_references: usize,
    pub broken_reference_paths: Vec<String>,
}

impl ProjectStatus {
    pub fn is_clean(&self) -> bool {
        self.broken_references == 0 && self.duplicate_references == 0
    }

    pub fn print(&self) {
        use owo_colors::OwoColorize;

        println!("{}", "Xcode Project Status".bold());
        println!();
        println!("  File references: {}", self.file_references);
        println!("  Build files: {}", self.build_files);
        println!("  Groups: {}", self.groups);

        if self.broken_references > 0 {
            println!("  {} Broken references: {}", "⚠".yellow(), self.broken_references);
            for path in &self.broken_reference_paths {
                println!("      {}", path.dimmed());
            }
        } else {
            println!("  {} No broken references", "✓".green());
        }

        if self.duplicate_references > 0 {
            println!("  {} Duplicate references: {}", "⚠".yellow(), self.duplicate_references);
        } else {
            println!("  {} No duplicates", "✓".green());
        }
    }
}
