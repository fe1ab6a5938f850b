//! `compscan scan` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use compscan_core::config::CompscanConfig;
use compscan_core::error::{CompscanError, ConfigError};
use compscan_core::types::ResultCode;
use compscan_detect::orchestrator::{ScanOrchestrator, ScanResult};
use compscan_detect::registry::DetectorRegistry;

use crate::cli::ScanArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Default configuration file name; a missing file at this path falls
/// back to built-in defaults instead of failing the scan.
const DEFAULT_CONFIG_FILE: &str = "compscan.toml";

/// Execute the `scan` command.
pub async fn execute(
    args: ScanArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut config = load_config(config_path).await?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    info!(path = %args.path.display(), "starting component scan");

    let registry = DetectorRegistry::with_defaults();
    let (orchestrator, mut telemetry) = ScanOrchestrator::new(registry, config);

    // Drain per-detector telemetry events; they are also summarised in the report.
    let drain = tokio::spawn(async move {
        while let Some(event) = telemetry.recv().await {
            debug!(
                detector = %event.record.detector_id,
                result = %event.record.result_code,
                files = event.record.files_processed,
                "detector finished"
            );
        }
    });

    let result = orchestrator.scan().await;
    drop(orchestrator);
    let _ = drain.await;
    let result = result?;

    if result.result_code == ResultCode::PartialSuccess {
        warn!("some files could not be processed; results are partial");
    }

    let report = build_scan_report(&args.path.display().to_string(), &result);
    writer.render(&report)?;

    if result.result_code > ResultCode::PartialSuccess {
        return Err(CliError::ScanFailed {
            code: result.result_code,
        });
    }

    Ok(())
}

/// Load configuration, falling back to defaults when the implicit
/// `compscan.toml` does not exist. An explicitly passed path must exist.
async fn load_config(config_path: &Path) -> Result<CompscanConfig, CliError> {
    match CompscanConfig::load(config_path).await {
        Ok(config) => Ok(config),
        Err(CompscanError::Config(ConfigError::FileNotFound { .. }))
            if config_path == Path::new(DEFAULT_CONFIG_FILE) =>
        {
            debug!("no compscan.toml found, using defaults");
            let mut config = CompscanConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
        Err(e) => Err(CliError::Config(e.to_string())),
    }
}

/// Apply CLI argument overrides on top of the loaded configuration.
/// CLI flags have the highest precedence (above env vars and the file).
fn apply_overrides(config: &mut CompscanConfig, args: &ScanArgs) {
    config.scan.source_dir = args.path.display().to_string();

    if !args.exclusions.is_empty() {
        config.scan.exclusions = args.exclusions.clone();
    }
    if !args.detectors.is_empty() {
        config.detectors.enabled_ids = args.detectors.clone();
    }
    if !args.categories.is_empty() {
        config.detectors.categories = args.categories.clone();
    }
    if let Some(max_threads) = args.max_threads {
        config.scan.max_threads = max_threads;
    }
    if let Some(timeout) = args.timeout {
        config.scan.detector_timeout_secs = timeout;
    }
    if args.no_cleanup {
        config.scan.cleanup_created_files = false;
    }
    if args.dry_run {
        config.scan.cleanup_dry_run = true;
    }
}

fn build_scan_report(source_dir: &str, result: &ScanResult) -> ScanReport {
    let detectors = result
        .detector_records
        .iter()
        .map(|record| DetectorSummary {
            id: record.detector_id.clone(),
            version: record.detector_version,
            experimental: record.is_experimental,
            result_code: record.result_code,
            files_processed: record.files_processed,
            parse_failures: record.parse_failures,
            component_count: record.component_count,
            duration_ms: record.duration_ms,
        })
        .collect();

    let components = result
        .components
        .iter()
        .map(|scanned| ComponentEntry {
            ecosystem: scanned.component.component_type.to_string(),
            name: scanned.component.name.clone(),
            version: scanned.component.version.clone(),
            detector_id: scanned.detector_id.clone(),
            development: scanned.is_development_dependency,
            top_level_referrers: scanned
                .top_level_referrers
                .iter()
                .map(|c| c.id())
                .collect(),
            file_paths: scanned
                .file_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        })
        .collect();

    ScanReport {
        source_dir: source_dir.to_owned(),
        result_code: result.result_code,
        duration_ms: result.duration.as_millis() as u64,
        directories_walked: result.directories_walked,
        component_count: result.components.len(),
        detectors,
        components,
        skipped_files: result.skipped_components.clone(),
    }
}

/// Final scan report rendered to the user.
#[derive(Serialize)]
pub struct ScanReport {
    pub source_dir: String,
    pub result_code: ResultCode,
    pub duration_ms: u64,
    pub directories_walked: u64,
    pub component_count: usize,
    pub detectors: Vec<DetectorSummary>,
    pub components: Vec<ComponentEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

#[derive(Serialize)]
pub struct DetectorSummary {
    pub id: String,
    pub version: u32,
    pub experimental: bool,
    pub result_code: ResultCode,
    pub files_processed: u64,
    pub parse_failures: u64,
    pub component_count: usize,
    pub duration_ms: u64,
}

#[derive(Serialize)]
pub struct ComponentEntry {
    pub ecosystem: String,
    pub name: String,
    pub version: String,
    pub detector_id: String,
    pub development: Option<bool>,
    pub top_level_referrers: Vec<String>,
    pub file_paths: Vec<String>,
}

impl Render for ScanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Scan: {}", self.source_dir.bold())?;

        let code_str = self.result_code.to_string();
        let code_colored = match self.result_code {
            ResultCode::Success => code_str.green().bold(),
            ResultCode::PartialSuccess => code_str.yellow().bold(),
            _ => code_str.red().bold(),
        };
        writeln!(w, "Result: {}", code_colored)?;
        writeln!(
            w,
            "Directories walked: {}  Duration: {}ms",
            self.directories_walked, self.duration_ms
        )?;
        writeln!(w)?;

        writeln!(
            w,
            "{:<18} {:<4} {:<16} {:>6} {:>9} {:>11} {:>9}",
            "Detector", "Ver", "Result", "Files", "Failures", "Components", "Time(ms)"
        )?;
        writeln!(w, "{}", "-".repeat(80))?;
        for d in &self.detectors {
            let id = if d.experimental {
                format!("{} (exp)", d.id)
            } else {
                d.id.clone()
            };
            writeln!(
                w,
                "{:<18} {:<4} {:<16} {:>6} {:>9} {:>11} {:>9}",
                id,
                d.version,
                d.result_code.to_string(),
                d.files_processed,
                d.parse_failures,
                d.component_count,
                d.duration_ms
            )?;
        }
        writeln!(w)?;

        if self.components.is_empty() {
            writeln!(w, "No components detected.")?;
        } else {
            writeln!(w, "Components ({}):", self.component_count)?;
            writeln!(
                w,
                "{:<8} {:<32} {:<16} {:<5} Roots",
                "Type", "Name", "Version", "Dev"
            )?;
            writeln!(w, "{}", "-".repeat(80))?;
            for c in &self.components {
                let dev = match c.development {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "-",
                };
                writeln!(
                    w,
                    "{:<8} {:<32} {:<16} {:<5} {}",
                    c.ecosystem,
                    c.name,
                    c.version,
                    dev,
                    c.top_level_referrers.len()
                )?;
            }
        }

        if !self.skipped_files.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "{}",
                format!("Skipped files ({}):", self.skipped_files.len()).yellow()
            )?;
            for path in &self.skipped_files {
                writeln!(w, "  {}", path)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ScanArgs;
    use std::path::PathBuf;

    fn scan_args(path: &str) -> ScanArgs {
        ScanArgs {
            path: PathBuf::from(path),
            exclusions: Vec::new(),
            detectors: Vec::new(),
            categories: Vec::new(),
            max_threads: None,
            timeout: None,
            no_cleanup: false,
            dry_run: false,
        }
    }

    #[test]
    fn test_apply_overrides_sets_source_dir() {
        let mut config = CompscanConfig::default();
        apply_overrides(&mut config, &scan_args("/repo"));
        assert_eq!(config.scan.source_dir, "/repo");
    }

    #[test]
    fn test_apply_overrides_replaces_exclusions_when_given() {
        let mut config = CompscanConfig::default();
        let mut args = scan_args(".");
        args.exclusions = vec!["dist".to_owned()];
        apply_overrides(&mut config, &args);
        assert_eq!(config.scan.exclusions, vec!["dist"]);

        // no flag keeps the configured list
        let mut config = CompscanConfig::default();
        apply_overrides(&mut config, &scan_args("."));
        assert_eq!(config.scan.exclusions, vec![".git"]);
    }

    #[test]
    fn test_apply_overrides_cleanup_flags() {
        let mut config = CompscanConfig::default();
        let mut args = scan_args(".");
        args.no_cleanup = true;
        args.dry_run = true;
        apply_overrides(&mut config, &args);
        assert!(!config.scan.cleanup_created_files);
        assert!(config.scan.cleanup_dry_run);
    }

    #[test]
    fn test_apply_overrides_numeric_limits() {
        let mut config = CompscanConfig::default();
        let mut args = scan_args(".");
        args.max_threads = Some(8);
        args.timeout = Some(120);
        apply_overrides(&mut config, &args);
        assert_eq!(config.scan.max_threads, 8);
        assert_eq!(config.scan.detector_timeout_secs, 120);
    }

    #[test]
    fn test_apply_overrides_detector_selection() {
        let mut config = CompscanConfig::default();
        let mut args = scan_args(".");
        args.detectors = vec!["npm-lockfile".to_owned()];
        args.categories = vec!["go".to_owned()];
        apply_overrides(&mut config, &args);
        assert_eq!(config.detectors.enabled_ids, vec!["npm-lockfile"]);
        assert_eq!(config.detectors.categories, vec!["go"]);
    }

    #[tokio::test]
    async fn test_load_config_missing_default_falls_back() {
        // the crate directory carries no compscan.toml, so the default
        // path is absent and built-in defaults apply
        let config = load_config(Path::new(DEFAULT_CONFIG_FILE))
            .await
            .expect("fallback should succeed");
        assert_eq!(config.scan.detector_timeout_secs, 900);
    }

    #[tokio::test]
    async fn test_load_config_missing_explicit_path_fails() {
        let result = load_config(Path::new("/no/such/custom.toml")).await;
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_scan_report_render_text() {
        let report = ScanReport {
            source_dir: "/repo".to_owned(),
            result_code: ResultCode::Success,
            duration_ms: 42,
            directories_walked: 10,
            component_count: 1,
            detectors: vec![DetectorSummary {
                id: "npm-lockfile".to_owned(),
                version: 2,
                experimental: false,
                result_code: ResultCode::Success,
                files_processed: 1,
                parse_failures: 0,
                component_count: 1,
                duration_ms: 12,
            }],
            components: vec![ComponentEntry {
                ecosystem: "npm".to_owned(),
                name: "express".to_owned(),
                version: "4.19.2".to_owned(),
                detector_id: "npm-lockfile".to_owned(),
                development: Some(false),
                top_level_referrers: vec!["express 4.19.2 - npm".to_owned()],
                file_paths: vec!["/repo/package-lock.json".to_owned()],
            }],
            skipped_files: Vec::new(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Scan: "), "should contain header");
        assert!(output.contains("npm-lockfile"), "should list detectors");
        assert!(output.contains("express"), "should list components");
        assert!(
            !output.contains("Skipped files"),
            "no skipped section when empty"
        );
    }

    #[test]
    fn test_scan_report_render_text_skipped_files() {
        let report = ScanReport {
            source_dir: "/repo".to_owned(),
            result_code: ResultCode::PartialSuccess,
            duration_ms: 5,
            directories_walked: 1,
            component_count: 0,
            detectors: Vec::new(),
            components: Vec::new(),
            skipped_files: vec!["/repo/bad-lock.json".to_owned()],
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("No components detected."));
        assert!(output.contains("Skipped files (1):"));
        assert!(output.contains("bad-lock.json"));
    }

    #[test]
    fn test_scan_report_json_skips_empty_skipped_files() {
        let report = ScanReport {
            source_dir: "/repo".to_owned(),
            result_code: ResultCode::Success,
            duration_ms: 1,
            directories_walked: 1,
            component_count: 0,
            detectors: Vec::new(),
            components: Vec::new(),
            skipped_files: Vec::new(),
        };

        let json = serde_json::to_string(&report).expect("serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
        assert!(parsed.get("skipped_files").is_none());
        assert_eq!(parsed["component_count"].as_u64(), Some(0));
    }
}
