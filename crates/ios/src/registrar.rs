//! Source file registration for project.pbxproj
//!
//! Registers source files by splicing text fragments next to known anchors:
//!
//! 1. `PBXBuildFile` lines before the end of the build file section
//! 2. `PBXFileReference` lines before the end of the file reference section
//! 3. A child line at the head of each existing target group
//! 4. A new `PBXGroup` block in front of a sibling group
//! 5. A reference to that block inside its parent group
//! 6. Build file lines at the end of the sources build phase
//!
//! The descriptor is read once and written once. Each step reports whether
//! its anchor was found; a missing anchor skips only that step.

use crate::pbxid::{IdAllocator, IdGenerator, RandomIds};
use crate::xcodeproj::XcodeProject;
use downloader_core::config::{AnchorConfig, ConfigSchema};
use downloader_core::error::{Error, Result, ResultExt};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const BUILD_FILE_SECTION_END: &str = "/* End PBXBuildFile section */";
const FILE_REF_SECTION_END: &str = "/* End PBXFileReference section */";

/// An existing object located by identifier and comment label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub id: String,
    pub label: String,
}

impl Anchor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl From<&AnchorConfig> for Anchor {
    fn from(config: &AnchorConfig) -> Self {
        Self::new(&config.id, &config.label)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /* {} */", self.id, self.label)
    }
}

/// One source file to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub name: String,
    pub path: String,
    pub group: String,
}

impl RegistrationRecord {
    pub fn new(name: &str, path: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            group: group.to_string(),
        }
    }
}

/// Group created alongside the registration
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub path: String,
    pub before: Anchor,
    pub parent: Anchor,
    pub after: Option<Anchor>,
}

/// Everything a registration run needs
#[derive(Debug, Clone)]
pub struct RegistrationPlan {
    pub pbxproj: PathBuf,
    pub files: Vec<RegistrationRecord>,
    pub file_type: Option<String>,
    pub groups: Vec<Anchor>,
    pub new_group: Option<NewGroup>,
    pub phase: Anchor,
    pub skip_existing: bool,
    pub dry_run: bool,
}

impl RegistrationPlan {
    /// Build a plan from loaded configuration
    pub fn from_config(schema: &ConfigSchema) -> Self {
        let reg = &schema.registration;
        Self {
            pbxproj: PathBuf::from(&schema.project.pbxproj),
            files: reg
                .files
                .iter()
                .map(|f| RegistrationRecord::new(&f.name, &f.path, &f.group))
                .collect(),
            file_type: reg.file_type.clone(),
            groups: reg.groups.iter().map(Anchor::from).collect(),
            new_group: reg.active_new_group().map(|g| NewGroup {
                name: g.name.clone(),
                path: g.path.clone(),
                before: Anchor::from(&g.before),
                parent: Anchor::from(&g.parent),
                after: g.after.as_ref().map(Anchor::from),
            }),
            phase: Anchor::from(&reg.phase),
            skip_existing: reg.skip_existing,
            dry_run: false,
        }
    }

    /// The stock DownloaderApp Series registration
    pub fn downloader_app() -> Self {
        Self::from_config(&ConfigSchema::default())
    }

    /// Directory holding the .xcodeproj bundle
    pub fn project_root(&self) -> &Path {
        self.pbxproj
            .parent()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Message printed after a complete run
    pub fn success_message(&self) -> String {
        let what = self.new_group.as_ref().map_or("source", |g| g.name.as_str());
        format!("Successfully added {} files to Xcode project!", what)
    }

    fn file_type_for(&self, record: &RegistrationRecord) -> String {
        self.file_type
            .clone()
            .unwrap_or_else(|| file_type_for_path(&record.name).to_string())
    }
}

/// `lastKnownFileType` for a file name
pub fn file_type_for_path(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("swift") => "sourcecode.swift",
        Some("m") => "sourcecode.c.objc",
        Some("mm") => "sourcecode.cpp.objcpp",
        Some("h") => "sourcecode.c.h",
        Some("c") => "sourcecode.c.c",
        Some("cpp" | "cc") => "sourcecode.cpp.cpp",
        Some("metal") => "sourcecode.metal",
        _ => "text",
    }
}

/// Which insertion a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    BuildFiles,
    FileReferences,
    GroupChildren,
    NewGroup,
    ParentLink,
    BuildPhase,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::BuildFiles => "build files",
            Step::FileReferences => "file references",
            Step::GroupChildren => "group children",
            Step::NewGroup => "new group",
            Step::ParentLink => "parent group link",
            Step::BuildPhase => "build phase",
        };
        f.write_str(name)
    }
}

/// Result of a single insertion step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Inserted { entries: usize },
    AnchorNotFound { anchor: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub target: String,
    pub outcome: StepOutcome,
}

impl StepReport {
    pub fn is_inserted(&self) -> bool {
        matches!(self.outcome, StepOutcome::Inserted { .. })
    }

    /// An anchor the step needed was missing from the project
    pub fn is_missing_anchor(&self) -> bool {
        matches!(self.outcome, StepOutcome::AnchorNotFound { .. })
    }
}

/// A record together with the identifiers it was given
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredFile {
    pub name: String,
    pub path: String,
    pub group: String,
    pub build_id: String,
    pub file_ref_id: String,
}

/// Outcome of a registration run
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    pub project: PathBuf,
    pub files: Vec<RegisteredFile>,
    pub new_group_id: Option<String>,
    pub steps: Vec<StepReport>,
    pub skipped_existing: Vec<String>,
    pub missing_sources: Vec<String>,
    pub written: bool,
}

impl RegistrationReport {
    /// True when no step was held back by a missing anchor
    pub fn is_complete(&self) -> bool {
        !self.steps.iter().any(StepReport::is_missing_anchor)
    }

    /// Steps whose anchor was not found
    pub fn incomplete_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.is_missing_anchor())
    }

    /// Every identifier generated by the run
    pub fn identifiers(&self) -> Vec<&str> {
        self.files
            .iter()
            .flat_map(|f| [f.build_id.as_str(), f.file_ref_id.as_str()])
            .chain(self.new_group_id.as_deref())
            .collect()
    }

    pub fn step(&self, step: Step, target: &str) -> Option<&StepReport> {
        self.steps
            .iter()
            .find(|s| s.step == step && s.target == target)
    }
}

/// Registers source files in a project descriptor
pub struct Registrar<G: IdGenerator = RandomIds> {
    plan: RegistrationPlan,
    ids: G,
}

impl Registrar<RandomIds> {
    pub fn new(plan: RegistrationPlan) -> Self {
        Self::with_generator(plan, RandomIds)
    }
}

impl<G: IdGenerator> Registrar<G> {
    pub fn with_generator(plan: RegistrationPlan, ids: G) -> Self {
        Self { plan, ids }
    }

    pub fn plan(&self) -> &RegistrationPlan {
        &self.plan
    }

    /// Read, mutate and (unless dry-run) write the descriptor
    pub fn run(&mut self) -> Result<RegistrationReport> {
        let path = self.plan.pbxproj.clone();
        if !path.exists() {
            return Err(Error::project_not_found(&path));
        }

        let content = fs::read_to_string(&path)
            .map_err(Error::from)
            .context(format!("Reading {}", path.display()))?;

        let (updated, mut report) = self.apply(&content)?;

        let root = self.plan.project_root();
        report.missing_sources = report
            .files
            .iter()
            .filter(|f| !root.join(&f.path).exists())
            .map(|f| f.path.clone())
            .collect();
        for missing in &report.missing_sources {
            tracing::warn!(path = %missing, "Registered source file not found on disk");
        }

        if self.plan.dry_run {
            tracing::info!(path = %path.display(), "Dry run, project left unchanged");
        } else {
            fs::write(&path, &updated)
                .map_err(Error::from)
                .context(format!("Writing {}", path.display()))?;
            report.written = true;
            tracing::info!(path = %path.display(), files = report.files.len(), "Project updated");
        }

        Ok(report)
    }

    /// Apply every insertion to descriptor text
    pub fn apply(&mut self, original: &str) -> Result<(String, RegistrationReport)> {
        let plan = &self.plan;
        let mut content = original.to_string();
        let mut steps = Vec::new();

        let mut skipped_existing = Vec::new();
        let records: Vec<&RegistrationRecord> = if plan.skip_existing {
            let project = XcodeProject::parse(original, plan.project_root());
            plan.files
                .iter()
                .filter(|r| {
                    let exists = project.find_file_reference_by_path(&r.name).is_some();
                    if exists {
                        tracing::debug!(file = %r.name, "Already registered, skipping");
                        skipped_existing.push(r.name.clone());
                    }
                    !exists
                })
                .collect()
        } else {
            plan.files.iter().collect()
        };

        let mut alloc = IdAllocator::new(&mut self.ids);
        let files: Vec<RegisteredFile> = records
            .iter()
            .map(|r| {
                let file_ref_id = alloc.allocate(&content);
                let build_id = alloc.allocate(&content);
                RegisteredFile {
                    name: r.name.clone(),
                    path: r.path.clone(),
                    group: r.group.clone(),
                    build_id,
                    file_ref_id,
                }
            })
            .collect();

        // Sections
        let build_lines: Vec<String> = files.iter().map(build_file_line).collect();
        steps.push(StepReport {
            step: Step::BuildFiles,
            target: "PBXBuildFile section".to_string(),
            outcome: insert_section_lines(&mut content, BUILD_FILE_SECTION_END, &build_lines),
        });

        let ref_lines: Vec<String> = records
            .iter()
            .zip(&files)
            .map(|(r, f)| file_ref_line(f, &plan.file_type_for(r)))
            .collect();
        steps.push(StepReport {
            step: Step::FileReferences,
            target: "PBXFileReference section".to_string(),
            outcome: insert_section_lines(&mut content, FILE_REF_SECTION_END, &ref_lines),
        });

        // Existing groups
        for anchor in &plan.groups {
            if !plan.files.iter().any(|r| r.group == anchor.label) {
                continue;
            }
            let members: Vec<&RegisteredFile> =
                files.iter().filter(|f| f.group == anchor.label).collect();
            let outcome = if members.is_empty() {
                skipped("all files already registered")
            } else {
                let text: String = members
                    .iter()
                    .map(|f| child_line(&f.file_ref_id, &f.name))
                    .collect();
                insert_after_list_open(&mut content, anchor, "children", &text, members.len())?
            };
            steps.push(StepReport {
                step: Step::GroupChildren,
                target: anchor.label.clone(),
                outcome,
            });
        }

        // New group and its link from the parent
        let mut new_group_id = None;
        if let Some(group) = &plan.new_group {
            let members: Vec<&RegisteredFile> =
                files.iter().filter(|f| f.group == group.name).collect();

            let (block_outcome, link_outcome) = if members.is_empty() {
                let reason = if plan.files.iter().any(|r| r.group == group.name) {
                    "all files already registered"
                } else {
                    "no files target this group"
                };
                (skipped(reason), skipped(reason))
            } else {
                let gid = alloc.allocate(&content);
                let block = group_block(&gid, group, &members);
                let marker = format!("{} = {{", group.before);
                let block_outcome = insert_before_line(&mut content, &marker, &block, 1)
                    .unwrap_or_else(|| anchor_not_found(&group.before));

                let link_outcome = if matches!(block_outcome, StepOutcome::Inserted { .. }) {
                    let text = child_line(&gid, &group.name);
                    let outcome = match &group.after {
                        Some(after) => insert_after_child(&mut content, &group.parent, after, &text)?,
                        None => {
                            insert_after_list_open(&mut content, &group.parent, "children", &text, 1)?
                        }
                    };
                    new_group_id = Some(gid);
                    outcome
                } else {
                    skipped("group block was not inserted")
                };
                (block_outcome, link_outcome)
            };

            steps.push(StepReport {
                step: Step::NewGroup,
                target: group.name.clone(),
                outcome: block_outcome,
            });
            steps.push(StepReport {
                step: Step::ParentLink,
                target: group.parent.label.clone(),
                outcome: link_outcome,
            });
        }

        let phase_lines: Vec<String> = files.iter().map(phase_line).collect();
        let outcome = if phase_lines.is_empty() {
            skipped("no files to register")
        } else {
            append_to_list(&mut content, &plan.phase, "files", &phase_lines)?
        };
        steps.push(StepReport {
            step: Step::BuildPhase,
            target: plan.phase.label.clone(),
            outcome,
        });

        for step in &steps {
            match &step.outcome {
                StepOutcome::Inserted { entries } => {
                    tracing::debug!(step = %step.step, target = %step.target, entries, "Inserted");
                }
                StepOutcome::AnchorNotFound { anchor } => {
                    tracing::warn!(step = %step.step, target = %step.target, anchor = %anchor, "Anchor not found, step skipped");
                }
                StepOutcome::Skipped { reason } => {
                    tracing::debug!(step = %step.step, target = %step.target, reason = %reason, "Step skipped");
                }
            }
        }

        let report = RegistrationReport {
            project: plan.pbxproj.clone(),
            files,
            new_group_id,
            steps,
            skipped_existing,
            missing_sources: Vec::new(),
            written: false,
        };
        Ok((content, report))
    }
}

/// A problem found when re-reading a registered project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyIssue {
    pub file: String,
    pub problem: String,
}

impl fmt::Display for VerifyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.problem)
    }
}

/// Check that every registered file is wired into the project text
pub fn verify(content: &str, plan: &RegistrationPlan, report: &RegistrationReport) -> Vec<VerifyIssue> {
    let project = XcodeProject::parse(content, plan.project_root());
    let phase_files: Vec<String> = project
        .build_files_for_phase(&plan.phase.id)
        .into_iter()
        .map(|bf| bf.id)
        .collect();

    let mut issues = Vec::new();
    let mut issue = |file: &RegisteredFile, problem: String| {
        issues.push(VerifyIssue {
            file: file.name.clone(),
            problem,
        });
    };

    for file in &report.files {
        if !project.file_references().any(|fr| fr.id == file.file_ref_id) {
            issue(file, "file reference missing".to_string());
        }
        match project.build_file(&file.build_id) {
            Some(bf) if bf.file_ref_id == file.file_ref_id => {}
            Some(_) => issue(file, "build file points at another reference".to_string()),
            None => issue(file, "build file missing".to_string()),
        }
        if !phase_files.contains(&file.build_id) {
            issue(file, format!("not in {} build phase", plan.phase.label));
        }

        let group_id = plan
            .groups
            .iter()
            .find(|g| g.label == file.group)
            .map(|g| g.id.clone())
            .or_else(|| report.new_group_id.clone());
        let in_group = group_id
            .as_deref()
            .and_then(|id| project.group(id))
            .is_some_and(|g| g.children.iter().any(|c| c.id == file.file_ref_id));
        if !in_group {
            issue(file, format!("not a child of group {}", file.group));
        }
    }

    if let (Some(gid), Some(group)) = (&report.new_group_id, &plan.new_group) {
        let linked = project
            .group(&group.parent.id)
            .is_some_and(|p| p.children.iter().any(|c| &c.id == gid));
        if !linked {
            issues.push(VerifyIssue {
                file: group.name.clone(),
                problem: format!("group not linked from {}", group.parent.label),
            });
        }
    }

    issues
}

fn skipped(reason: &str) -> StepOutcome {
    StepOutcome::Skipped {
        reason: reason.to_string(),
    }
}

fn anchor_not_found(anchor: impl fmt::Display) -> StepOutcome {
    StepOutcome::AnchorNotFound {
        anchor: anchor.to_string(),
    }
}

/// Render a string the way Xcode does, quoting when needed
pub fn pbx_string(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '/' | ':' | '.' | '-'));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn build_file_line(file: &RegisteredFile) -> String {
    format!(
        "\t\t{} /* {} in Sources */ = {{isa = PBXBuildFile; fileRef = {} /* {} */; }};",
        file.build_id, file.name, file.file_ref_id, file.name
    )
}

fn file_ref_line(file: &RegisteredFile, file_type: &str) -> String {
    format!(
        "\t\t{} /* {} */ = {{isa = PBXFileReference; lastKnownFileType = {}; path = {}; sourceTree = \"<group>\"; }};",
        file.file_ref_id,
        file.name,
        file_type,
        pbx_string(&file.name)
    )
}

fn child_line(id: &str, name: &str) -> String {
    format!("\n\t\t\t\t{} /* {} */,", id, name)
}

fn phase_line(file: &RegisteredFile) -> String {
    format!("\t\t\t\t{} /* {} in Sources */,", file.build_id, file.name)
}

fn group_block(gid: &str, group: &NewGroup, members: &[&RegisteredFile]) -> String {
    let children: String = members
        .iter()
        .map(|f| format!("\t\t\t\t{} /* {} */,\n", f.file_ref_id, f.name))
        .collect();
    format!(
        "\t\t{gid} /* {name} */ = {{\n\
         \t\t\tisa = PBXGroup;\n\
         \t\t\tchildren = (\n\
         {children}\
         \t\t\t);\n\
         \t\t\tpath = {path};\n\
         \t\t\tsourceTree = \"<group>\";\n\
         \t\t}};\n",
        name = group.name,
        path = pbx_string(&group.path),
    )
}

fn insert_section_lines(content: &mut String, marker: &str, lines: &[String]) -> StepOutcome {
    if lines.is_empty() {
        return skipped("no files to register");
    }
    let mut block = lines.join("\n");
    block.push('\n');
    insert_before_line(content, marker, &block, lines.len()).unwrap_or_else(|| anchor_not_found(marker))
}

/// Insert `block` at the start of the line containing `marker`
fn insert_before_line(content: &mut String, marker: &str, block: &str, entries: usize) -> Option<StepOutcome> {
    let pos = content.find(marker)?;
    let line_start = content[..pos].rfind('\n').map_or(0, |i| i + 1);
    content.insert_str(line_start, block);
    Some(StepOutcome::Inserted { entries })
}

fn object_list_re(anchor: &Anchor, list: &str) -> Result<Regex> {
    let pattern = format!(
        r"(?s){} /\* {} \*/ = \{{[^}}]*?\b{} = \(",
        regex::escape(&anchor.id),
        regex::escape(&anchor.label),
        regex::escape(list)
    );
    Ok(Regex::new(&pattern)?)
}

/// Insert `text` right after the `(` opening the object's list
fn insert_after_list_open(
    content: &mut String,
    anchor: &Anchor,
    list: &str,
    text: &str,
    entries: usize,
) -> Result<StepOutcome> {
    let re = object_list_re(anchor, list)?;
    let Some(m) = re.find(content) else {
        return Ok(anchor_not_found(anchor));
    };
    let end = m.end();
    content.insert_str(end, text);
    Ok(StepOutcome::Inserted { entries })
}

/// Insert `text` right after the `after` child entry of the parent's children
fn insert_after_child(content: &mut String, parent: &Anchor, after: &Anchor, text: &str) -> Result<StepOutcome> {
    let not_found = || anchor_not_found(format!("{} after {}", parent, after));
    let re = object_list_re(parent, "children")?;
    let Some(m) = re.find(content) else {
        return Ok(not_found());
    };
    let open_end = m.end();
    let Some(close) = list_close(content, open_end) else {
        return Ok(not_found());
    };
    let entry = format!("{} /* {} */,", after.id, after.label);
    let Some(offset) = content[open_end..close].find(&entry) else {
        return Ok(not_found());
    };
    content.insert_str(open_end + offset + entry.len(), text);
    Ok(StepOutcome::Inserted { entries: 1 })
}

/// Append lines at the end of the object's list, before its closing `)`
fn append_to_list(content: &mut String, anchor: &Anchor, list: &str, lines: &[String]) -> Result<StepOutcome> {
    let re = object_list_re(anchor, list)?;
    let Some(m) = re.find(content) else {
        return Ok(anchor_not_found(anchor));
    };
    let open_end = m.end();
    let Some(close) = list_close(content, open_end) else {
        return Ok(anchor_not_found(format!("{} {} list end", anchor, list)));
    };
    let line_start = content[..close].rfind('\n').map_or(0, |i| i + 1);

    let closing_on_own_line =
        line_start > open_end && content[line_start..close].chars().all(char::is_whitespace);
    if closing_on_own_line {
        let mut block = lines.join("\n");
        block.push('\n');
        content.insert_str(line_start, &block);
    } else {
        content.insert_str(close, &format!("\n{}\n\t\t\t", lines.join("\n")));
    }
    Ok(StepOutcome::Inserted {
        entries: lines.len(),
    })
}

/// Byte offset of the `)` closing a list opened just before `from`
///
/// Entry comments and quoted strings may contain parentheses, so both are
/// stepped over.
fn list_close(content: &str, from: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2 + content[i + 2..].find("*/")? + 2;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                i += 1;
            }
            b')' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use downloader_core::config::is_object_id;
    use tempfile::TempDir;

    /// Counter-based identifiers for reproducible output
    struct Sequential(u64);

    impl IdGenerator for Sequential {
        fn next_id(&mut self) -> String {
            self.0 += 1;
            format!("{:024X}", self.0)
        }
    }

    const MODELS: &str = "89178667549452CF16F0DABF";
    const SERVICES: &str = "F8D9F194C6E8D952D1E11C35";
    const VIEW_MODELS: &str = "932AD4F5AE6B9226D18E7611";
    const MOVIES: &str = "8748C644739E273BB62F4CD4";
    const VIEWS: &str = "9B349A59D9A8626A27783AC7";
    const SOURCES: &str = "FA5D87D555F7D17824329C20";

    fn empty_group(id: &str, label: &str) -> String {
        format!(
            "\t\t{id} /* {label} */ = {{\n\t\t\tisa = PBXGroup;\n\t\t\tchildren = (\n\t\t\t);\n\t\t\tpath = {label};\n\t\t\tsourceTree = \"<group>\";\n\t\t}};\n"
        )
    }

    fn fixture() -> String {
        let mut text = String::from(
            "// !$*UTF8*$!\n{\n\tarchiveVersion = 1;\n\tobjects = {\n\n\
             /* Begin PBXBuildFile section */\n/* End PBXBuildFile section */\n\n\
             /* Begin PBXFileReference section */\n/* End PBXFileReference section */\n\n\
             /* Begin PBXGroup section */\n",
        );
        text.push_str(&empty_group(MODELS, "Models"));
        text.push_str(&empty_group(SERVICES, "Services"));
        text.push_str(&empty_group(VIEW_MODELS, "ViewModels"));
        text.push_str(&empty_group(MOVIES, "Movies"));
        text.push_str(&format!(
            "\t\t{VIEWS} /* Views */ = {{\n\t\t\tisa = PBXGroup;\n\t\t\tchildren = (\n\t\t\t\t{MOVIES} /* Movies */,\n\t\t\t);\n\t\t\tpath = Views;\n\t\t\tsourceTree = \"<group>\";\n\t\t}};\n"
        ));
        text.push_str("/* End PBXGroup section */\n\n/* Begin PBXSourcesBuildPhase section */\n");
        text.push_str(&format!(
            "\t\t{SOURCES} /* Sources */ = {{\n\t\t\tisa = PBXSourcesBuildPhase;\n\t\t\tbuildActionMask = 2147483647;\n\t\t\tfiles = (\n\t\t\t);\n\t\t\trunOnlyForDeploymentPostprocessing = 0;\n\t\t}};\n"
        ));
        text.push_str("/* End PBXSourcesBuildPhase section */\n\t};\n\trootObject = 0123456789ABCDEF01234567 /* Project object */;\n}\n");
        text
    }

    fn registrar() -> Registrar<Sequential> {
        Registrar::with_generator(RegistrationPlan::downloader_app(), Sequential(0))
    }

    fn id_of<'a>(report: &'a RegistrationReport, name: &str) -> &'a RegisteredFile {
        report.files.iter().find(|f| f.name == name).unwrap()
    }

    #[test]
    fn test_single_run_counts() {
        let (out, report) = registrar().apply(&fixture()).unwrap();
        assert!(report.is_complete(), "{:?}", report.steps);
        assert!(report.steps.iter().all(StepReport::is_inserted));

        assert_eq!(out.matches("isa = PBXBuildFile;").count(), 5);
        assert_eq!(out.matches("isa = PBXFileReference;").count(), 5);
        assert_eq!(out.matches("/* Series */ = {").count(), 1);

        let project = XcodeProject::parse(&out, "/tmp");
        for id in [MODELS, SERVICES, VIEW_MODELS] {
            assert_eq!(project.group(id).unwrap().children.len(), 1);
        }
        let series = project.group(report.new_group_id.as_deref().unwrap()).unwrap();
        assert_eq!(series.children.len(), 2);
        assert_eq!(series.path.as_deref(), Some("Series"));
        assert_eq!(project.group(VIEWS).unwrap().children.len(), 2);
        assert_eq!(project.build_files_for_phase(SOURCES).len(), 5);
    }

    #[test]
    fn test_fragments_at_documented_positions() {
        let (out, report) = registrar().apply(&fixture()).unwrap();
        let series = id_of(&report, "Series.swift");

        let build_line = format!(
            "\t\t{} /* Series.swift in Sources */ = {{isa = PBXBuildFile; fileRef = {} /* Series.swift */; }};\n",
            series.build_id, series.file_ref_id
        );
        let service = id_of(&report, "SeriesService.swift");
        assert!(out.contains(&format!("{build_line}\t\t{} /* SeriesService.swift in Sources */", service.build_id)));

        let detail = id_of(&report, "SeriesDetailView.swift");
        assert!(out.contains(&format!(
            "\t\t{} /* SeriesDetailView.swift in Sources */ = {{isa = PBXBuildFile; fileRef = {} /* SeriesDetailView.swift */; }};\n/* End PBXBuildFile section */",
            detail.build_id, detail.file_ref_id
        )));
        assert!(out.contains(&format!(
            "\t\t{} /* SeriesDetailView.swift */ = {{isa = PBXFileReference; lastKnownFileType = sourcecode.swift; path = SeriesDetailView.swift; sourceTree = \"<group>\"; }};\n/* End PBXFileReference section */",
            detail.file_ref_id
        )));

        assert!(out.contains(&format!(
            "{MODELS} /* Models */ = {{\n\t\t\tisa = PBXGroup;\n\t\t\tchildren = (\n\t\t\t\t{} /* Series.swift */,\n\t\t\t);",
            series.file_ref_id
        )));

        let gid = report.new_group_id.as_deref().unwrap();
        let search = id_of(&report, "SeriesSearchView.swift");
        let expected_block = format!(
            "\t\t{gid} /* Series */ = {{\n\t\t\tisa = PBXGroup;\n\t\t\tchildren = (\n\t\t\t\t{} /* SeriesSearchView.swift */,\n\t\t\t\t{} /* SeriesDetailView.swift */,\n\t\t\t);\n\t\t\tpath = Series;\n\t\t\tsourceTree = \"<group>\";\n\t\t}};\n\t\t{MOVIES} /* Movies */ = {{",
            search.file_ref_id, detail.file_ref_id
        );
        assert!(out.contains(&expected_block));

        assert!(out.contains(&format!(
            "\t\t\t\t{MOVIES} /* Movies */,\n\t\t\t\t{gid} /* Series */,\n\t\t\t);"
        )));

        assert!(out.contains(&format!(
            "\t\t\t\t{} /* SeriesDetailView.swift in Sources */,\n\t\t\t);\n\t\t\trunOnlyForDeploymentPostprocessing",
            detail.build_id
        )));
    }

    #[test]
    fn test_second_run_doubles_counts() {
        let mut registrar = registrar();
        let (once, _) = registrar.apply(&fixture()).unwrap();
        let (twice, report) = registrar.apply(&once).unwrap();
        assert!(report.is_complete());

        assert_eq!(twice.matches("isa = PBXBuildFile;").count(), 10);
        assert_eq!(twice.matches("isa = PBXFileReference;").count(), 10);
        assert_eq!(twice.matches("/* Series */ = {").count(), 2);

        let project = XcodeProject::parse(&twice, "/tmp");
        for id in [MODELS, SERVICES, VIEW_MODELS] {
            assert_eq!(project.group(id).unwrap().children.len(), 2);
        }
        assert_eq!(project.group(VIEWS).unwrap().children.len(), 3);
        assert_eq!(project.build_files_for_phase(SOURCES).len(), 10);
    }

    #[test]
    fn test_missing_models_anchor_skips_only_that_step() {
        let text = fixture().replace(MODELS, "00000000000000000000ABCD");
        let (out, report) = registrar().apply(&text).unwrap();

        assert!(!report.is_complete());
        let incomplete: Vec<_> = report.incomplete_steps().collect();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].step, Step::GroupChildren);
        assert_eq!(incomplete[0].target, "Models");
        assert!(matches!(incomplete[0].outcome, StepOutcome::AnchorNotFound { .. }));

        let series = id_of(&report, "Series.swift");
        assert!(!out.contains(&format!("\t\t\t\t{} /* Series.swift */,", series.file_ref_id)));

        let service = id_of(&report, "SeriesService.swift");
        assert!(out.contains(&format!("\t\t\t\t{} /* SeriesService.swift */,", service.file_ref_id)));
        assert!(out.contains(&format!("{} /* Series.swift in Sources */ = {{", series.build_id)));
        assert!(out.contains(&format!("{} /* Series.swift */ = {{isa = PBXFileReference;", series.file_ref_id)));
        assert!(out.contains(&format!("{} /* Series */,", report.new_group_id.as_deref().unwrap())));
        assert!(out.contains(&format!("{} /* Series.swift in Sources */,", series.build_id)));
    }

    #[test]
    fn test_missing_sibling_skips_parent_link() {
        let text = fixture().replace(&format!("{MOVIES} /* Movies */ = {{"), "00000000000000000000FFFF /* Movies */ = {");
        let (out, report) = registrar().apply(&text).unwrap();

        assert!(matches!(
            report.step(Step::NewGroup, "Series").unwrap().outcome,
            StepOutcome::AnchorNotFound { .. }
        ));
        assert!(matches!(
            report.step(Step::ParentLink, "Views").unwrap().outcome,
            StepOutcome::Skipped { .. }
        ));
        assert!(!out.contains("/* Series */"));
        assert!(report.new_group_id.is_none());
        assert_eq!(report.identifiers().len(), 10);
    }

    #[test]
    fn test_identifiers_are_hex() {
        let mut registrar = Registrar::new(RegistrationPlan::downloader_app());
        let (_, report) = registrar.apply(&fixture()).unwrap();
        let ids = report.identifiers();
        assert_eq!(ids.len(), 11);
        for id in ids {
            assert_eq!(id.len(), 24);
            assert!(is_object_id(id), "{id}");
        }
    }

    #[test]
    fn test_skip_existing_makes_rerun_noop() {
        let mut plan = RegistrationPlan::downloader_app();
        plan.skip_existing = true;
        let mut registrar = Registrar::with_generator(plan, Sequential(0));

        let (once, _) = registrar.apply(&fixture()).unwrap();
        let (twice, report) = registrar.apply(&once).unwrap();

        assert_eq!(once, twice);
        assert!(report.is_complete());
        assert_eq!(report.skipped_existing.len(), 5);
        assert!(report.files.is_empty());
        assert!(report
            .steps
            .iter()
            .all(|s| matches!(s.outcome, StepOutcome::Skipped { .. })));
    }

    #[test]
    fn test_verify_clean_after_run() {
        let mut registrar = registrar();
        let (out, report) = registrar.apply(&fixture()).unwrap();
        assert!(verify(&out, registrar.plan(), &report).is_empty());
    }

    #[test]
    fn test_verify_reports_missing_group_child() {
        let text = fixture().replace(SERVICES, "00000000000000000000ABCD");
        let mut registrar = registrar();
        let (out, report) = registrar.apply(&text).unwrap();
        let issues = verify(&out, registrar.plan(), &report);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, "SeriesService.swift");
        assert!(issues[0].problem.contains("Services"));
    }

    #[test]
    fn test_append_to_single_line_list() {
        let mut content = format!("{SOURCES} /* Sources */ = {{\n\tfiles = ();\n}};");
        let outcome = append_to_list(
            &mut content,
            &Anchor::new(SOURCES, "Sources"),
            "files",
            &["\t\t\t\tAAAAAAAAAAAAAAAAAAAAAAAA /* A.swift in Sources */,".to_string()],
        )
        .unwrap();
        assert_eq!(outcome, StepOutcome::Inserted { entries: 1 });
        assert!(content.contains("files = (\n\t\t\t\tAAAAAAAAAAAAAAAAAAAAAAAA /* A.swift in Sources */,\n\t\t\t);"));
    }

    #[test]
    fn test_append_skips_parentheses_in_comments() {
        let mut content = format!(
            "{SOURCES} /* Sources */ = {{\n\t\t\tfiles = (\n\t\t\t\tBBBBBBBBBBBBBBBBBBBBBBBB /* Icon (Dark).swift in Sources */,\n\t\t\t\tCCCCCCCCCCCCCCCCCCCCCCCC /* App.swift in Sources */,\n\t\t\t);\n\t\t}};"
        );
        let outcome = append_to_list(
            &mut content,
            &Anchor::new(SOURCES, "Sources"),
            "files",
            &["\t\t\t\tAAAAAAAAAAAAAAAAAAAAAAAA /* A.swift in Sources */,".to_string()],
        )
        .unwrap();
        assert_eq!(outcome, StepOutcome::Inserted { entries: 1 });
        assert!(content.contains("/* Icon (Dark).swift in Sources */,"));
        assert!(content.contains(
            "CCCCCCCCCCCCCCCCCCCCCCCC /* App.swift in Sources */,\n\t\t\t\tAAAAAAAAAAAAAAAAAAAAAAAA /* A.swift in Sources */,\n\t\t\t);"
        ));
    }

    #[test]
    fn test_parent_link_after_parenthesized_child() {
        let text = fixture().replace(
            &format!("children = (\n\t\t\t\t{MOVIES} /* Movies */,"),
            &format!("children = (\n\t\t\t\tDDDDDDDDDDDDDDDDDDDDDDDD /* Icon (Dark).png */,\n\t\t\t\t{MOVIES} /* Movies */,"),
        );
        let (out, report) = registrar().apply(&text).unwrap();
        assert!(report.is_complete(), "{:?}", report.steps);

        let gid = report.new_group_id.as_deref().unwrap();
        assert!(out.contains(&format!("{MOVIES} /* Movies */,\n\t\t\t\t{gid} /* Series */,")));
        let project = XcodeProject::parse(&out, "/tmp");
        assert_eq!(project.group(VIEWS).unwrap().children.len(), 3);
    }

    #[test]
    fn test_parenthesized_name_survives_second_run() {
        let mut plan = RegistrationPlan::downloader_app();
        plan.files[0].name = "Series (Legacy).swift".to_string();
        let mut registrar = Registrar::with_generator(plan, Sequential(0));

        let (once, _) = registrar.apply(&fixture()).unwrap();
        let (twice, report) = registrar.apply(&once).unwrap();
        assert!(report.is_complete(), "{:?}", report.steps);

        assert_eq!(twice.matches("/* Series (Legacy).swift in Sources */,").count(), 2);
        let project = XcodeProject::parse(&twice, "/tmp");
        assert_eq!(project.build_files_for_phase(SOURCES).len(), 10);
        assert!(verify(&twice, registrar.plan(), &report).is_empty());
    }

    #[test]
    fn test_disabled_new_group_leaves_views_alone() {
        let mut schema = ConfigSchema::default();
        schema.registration.files.truncate(3);
        if let Some(group) = schema.registration.new_group.as_mut() {
            group.enabled = false;
        }
        let plan = RegistrationPlan::from_config(&schema);
        assert!(plan.new_group.is_none());

        let (out, report) = Registrar::with_generator(plan, Sequential(0)).apply(&fixture()).unwrap();
        assert!(report.is_complete(), "{:?}", report.steps);
        assert!(!out.contains("/* Series */"));
        assert!(report.step(Step::ParentLink, "Views").is_none());
        assert_eq!(report.identifiers().len(), 6);
    }

    #[test]
    fn test_file_type_for_path() {
        assert_eq!(file_type_for_path("Series.swift"), "sourcecode.swift");
        assert_eq!(file_type_for_path("Bridge.h"), "sourcecode.c.h");
        assert_eq!(file_type_for_path("README"), "text");
    }

    #[test]
    fn test_pbx_string_quotes_when_needed() {
        assert_eq!(pbx_string("Series.swift"), "Series.swift");
        assert_eq!(pbx_string("My View.swift"), "\"My View.swift\"");
        assert_eq!(pbx_string(""), "\"\"");
    }

    #[test]
    fn test_success_message() {
        assert_eq!(
            RegistrationPlan::downloader_app().success_message(),
            "Successfully added Series files to Xcode project!"
        );
    }

    #[test]
    fn test_run_writes_file() {
        let dir = TempDir::new().unwrap();
        let xcodeproj = dir.path().join("DownloaderApp.xcodeproj");
        fs::create_dir_all(&xcodeproj).unwrap();
        let pbxproj = xcodeproj.join("project.pbxproj");
        fs::write(&pbxproj, fixture()).unwrap();
        fs::create_dir_all(dir.path().join("DownloaderApp/Models")).unwrap();
        fs::write(dir.path().join("DownloaderApp/Models/Series.swift"), "").unwrap();

        let mut plan = RegistrationPlan::downloader_app();
        plan.pbxproj = pbxproj.clone();
        let report = Registrar::new(plan).run().unwrap();

        assert!(report.written);
        assert_eq!(report.missing_sources.len(), 4);
        assert!(!report.missing_sources.contains(&"DownloaderApp/Models/Series.swift".to_string()));
        let written = fs::read_to_string(&pbxproj).unwrap();
        assert_eq!(written.matches("isa = PBXBuildFile;").count(), 5);
    }

    #[test]
    fn test_dry_run_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let pbxproj = dir.path().join("project.pbxproj");
        fs::write(&pbxproj, fixture()).unwrap();

        let mut plan = RegistrationPlan::downloader_app();
        plan.pbxproj = pbxproj.clone();
        plan.dry_run = true;
        let report = Registrar::new(plan).run().unwrap();

        assert!(!report.written);
        assert!(report.is_complete());
        assert_eq!(fs::read_to_string(&pbxproj).unwrap(), fixture());
    }

    #[test]
    fn test_run_missing_file_fails_without_writing() {
        let dir = TempDir::new().unwrap();
        let pbxproj = dir.path().join("DownloaderApp.xcodeproj/project.pbxproj");

        let mut plan = RegistrationPlan::downloader_app();
        plan.pbxproj = pbxproj.clone();
        let err = Registrar::new(plan).run().unwrap_err();

        assert_eq!(err.code, downloader_core::ErrorCode::ProjectNotFound);
        assert!(!pbxproj.exists());
    }
}
