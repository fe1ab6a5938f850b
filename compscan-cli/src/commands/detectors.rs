//! `compscan detectors` command handler

use std::io::Write;

use serde::Serialize;

use compscan_detect::registry::DetectorRegistry;

use crate::cli::DetectorsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `detectors` command.
pub fn execute(args: DetectorsArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let registry = DetectorRegistry::with_defaults();
    let report = build_detector_list(&registry, args.category.as_deref());

    if report.detectors.is_empty() {
        if let Some(category) = args.category {
            return Err(CliError::Command(format!(
                "no detectors in category '{}'",
                category
            )));
        }
    }

    writer.render(&report)?;
    Ok(())
}

fn build_detector_list(registry: &DetectorRegistry, category: Option<&str>) -> DetectorListReport {
    let detectors = registry
        .detectors()
        .iter()
        .filter(|d| {
            category.is_none_or(|wanted| {
                d.categories()
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(wanted))
            })
        })
        .map(|d| DetectorEntry {
            id: d.id().to_owned(),
            version: d.version(),
            experimental: d.experimental(),
            categories: d.categories().iter().map(|c| (*c).to_owned()).collect(),
            search_patterns: d
                .search_patterns()
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        })
        .collect();

    DetectorListReport { detectors }
}

/// Listing of registered detectors.
#[derive(Serialize)]
pub struct DetectorListReport {
    pub detectors: Vec<DetectorEntry>,
}

#[derive(Serialize)]
pub struct DetectorEntry {
    pub id: String,
    pub version: u32,
    pub experimental: bool,
    pub categories: Vec<String>,
    pub search_patterns: Vec<String>,
}

impl Render for DetectorListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Registered detectors ({}):", self.detectors.len())?;
        writeln!(
            w,
            "{:<18} {:<4} {:<20} Patterns",
            "Id", "Ver", "Categories"
        )?;
        writeln!(w, "{}", "-".repeat(80))?;

        for d in &self.detectors {
            let id = if d.experimental {
                format!("{} (exp)", d.id).yellow().to_string()
            } else {
                d.id.clone()
            };
            writeln!(
                w,
                "{:<18} {:<4} {:<20} {}",
                id,
                d.version,
                d.categories.join(","),
                d.search_patterns.join(", ")
            )?;
        }

        Ok(())
    }
}
