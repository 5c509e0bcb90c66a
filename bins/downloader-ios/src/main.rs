//! DownloaderApp iOS CLI
//!
//! Xcode project maintenance for DownloaderApp. Run without a subcommand to
//! register the Series sources in `DownloaderApp.xcodeproj`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use downloader_cli::output::{format_count, format_duration, Status};
use downloader_core::config::Config;
use downloader_core::error::exit_codes;
use downloader_ios::registrar::{self, Registrar, RegistrationPlan, RegistrationReport, StepOutcome};
use downloader_ios::XcodeProject;
use downloader_telemetry::{TelemetryConfig, Timer};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "downloader-ios")]
#[command(about = "Xcode project tools for DownloaderApp")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register source files in project.pbxproj (default)
    Register {
        /// Path to project.pbxproj
        #[arg(long)]
        project: Option<PathBuf>,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Leave out files that are already referenced
        #[arg(long)]
        skip_existing: bool,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Xcode project inspection
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Show project status (broken refs, duplicates)
    Status {
        /// Path to .xcodeproj
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    downloader_telemetry::init_with_config(TelemetryConfig::from_verbosity(cli.verbose, cli.quiet))?;

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            Status::error(&e.to_string());
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };
    if let Some(path) = &config.path {
        tracing::debug!(path = %path.display(), "Loaded configuration");
    }

    let command = cli.command.unwrap_or(Commands::Register {
        project: None,
        dry_run: false,
        skip_existing: false,
        json: false,
    });

    let exit_code = match command {
        Commands::Register {
            project,
            dry_run,
            skip_existing,
            json,
        } => {
            let mut plan = RegistrationPlan::from_config(&config.schema);
            if let Some(project) = project {
                plan.pbxproj = project;
            }
            plan.dry_run = dry_run;
            plan.skip_existing |= skip_existing;
            run_register(plan, json, cli.quiet)
        }
        Commands::Project { action } => run_project(action, &config),
    };

    std::process::exit(exit_code);
}

fn run_register(plan: RegistrationPlan, json: bool, quiet: bool) -> i32 {
    let timer = Timer::start("register");
    let mut runner = Registrar::new(plan);

    let report = match runner.run() {
        Ok(report) => report,
        Err(e) => {
            if json {
                match serde_json::to_string_pretty(&e.to_report()) {
                    Ok(out) => println!("{}", out),
                    Err(_) => Status::error(&e.to_string()),
                }
            } else {
                Status::error(&e.to_string());
            }
            return exit_codes::FAILURE;
        }
    };
    let elapsed = timer.stop();

    let plan = runner.plan();
    let issues = if report.written {
        match std::fs::read_to_string(&plan.pbxproj) {
            Ok(content) => registrar::verify(&content, plan, &report),
            Err(e) => {
                tracing::warn!(error = %e, "Could not re-read project for verification");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    if json {
        let value = serde_json::json!({
            "report": report,
            "issues": issues,
        });
        match serde_json::to_string_pretty(&value) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                Status::error(&format!("Failed to serialize report: {}", e));
                return exit_codes::FAILURE;
            }
        }
    } else if !quiet {
        print_report(&report, elapsed);
        for issue in &issues {
            Status::warning(&format!("Verification: {}", issue));
        }
    }

    if !report.is_complete() {
        if !json {
            let incomplete = report.incomplete_steps().count();
            Status::warning(&format!(
                "Project {} with {} not applied",
                if report.written { "written" } else { "checked" },
                format_count(incomplete, "step", "steps")
            ));
        }
        return exit_codes::PARTIAL;
    }

    if !json && !quiet {
        if report.files.is_empty() && !report.skipped_existing.is_empty() {
            Status::info("All files are already registered, nothing to do");
        } else if plan.dry_run {
            Status::info("Dry run complete, project not modified");
        } else {
            Status::success(&plan.success_message());
        }
    }
    exit_codes::SUCCESS
}

fn print_report(report: &RegistrationReport, elapsed: std::time::Duration) {
    Status::info(&format!(
        "Registering {} in {} ({})",
        format_count(report.files.len(), "file", "files"),
        report.project.display(),
        format_duration(elapsed)
    ));

    for step in &report.steps {
        match &step.outcome {
            StepOutcome::Inserted { entries } => Status::detail(&format!(
                "{} ({}): {}",
                step.step,
                step.target,
                format_count(*entries, "entry", "entries")
            )),
            StepOutcome::AnchorNotFound { anchor } => Status::warning(&format!(
                "{} ({}): anchor not found: {}",
                step.step, step.target, anchor
            )),
            StepOutcome::Skipped { reason } => {
                Status::detail(&format!("{} ({}): skipped, {}", step.step, step.target, reason))
            }
        }
    }

    for name in &report.skipped_existing {
        Status::info(&format!("Already registered: {}", name));
    }
    for path in &report.missing_sources {
        Status::warning(&format!("Source file not found on disk: {}", path));
    }
}

fn run_project(action: ProjectAction, config: &Config) -> i32 {
    match action {
        ProjectAction::Status { project } => {
            let project = project.unwrap_or_else(|| {
                Path::new(&config.schema.project.pbxproj)
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            });
            Status::info(&format!("Analyzing {}...", project.display()));

            match XcodeProject::open(&project) {
                Ok(proj) => {
                    let status = proj.status();
                    println!();
                    status.print();
                    println!();
                    if status.is_clean() {
                        Status::success("Project is clean!");
                    } else {
                        Status::warning("Project has issues");
                    }
                    exit_codes::SUCCESS
                }
                Err(e) => {
                    Status::error(&format!("Failed to open project: {}", e));
                    exit_codes::FAILURE
                }
            }
        }
    }
}
