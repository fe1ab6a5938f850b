//! Report rendering -- one writer, two formats
//!
//! Every subcommand produces a serializable report struct and hands it to
//! [`OutputWriter::render`]. Text output goes through the payload's
//! [`Render`] impl; JSON output is pretty-printed so `compscan scan
//! --output json | jq` works out of the box. Logs go to stderr, so stdout
//! carries nothing but the report.

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Renders command reports to stdout in the format selected by `--output`.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a report to stdout.
    pub fn render<T: Render + Serialize>(&self, report: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.write_to(&mut handle, report)
    }

    fn write_to<W: Write, T: Render + Serialize>(
        &self,
        w: &mut W,
        report: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => report.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, report)?;
                // trailing newline so shells and pagers behave
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable rendering, implemented by every report struct
/// alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::detectors::{DetectorEntry, DetectorListReport};

    fn sample_report() -> DetectorListReport {
        DetectorListReport {
            detectors: vec![
                DetectorEntry {
                    id: "cargo-lockfile".to_owned(),
                    version: 1,
                    experimental: false,
                    categories: vec!["cargo".to_owned(), "rust".to_owned()],
                    search_patterns: vec!["Cargo.lock".to_owned()],
                },
                DetectorEntry {
                    id: "go-mod".to_owned(),
                    version: 1,
                    experimental: true,
                    categories: vec!["go".to_owned()],
                    search_patterns: vec!["go.mod".to_owned()],
                },
            ],
        }
    }

    #[test]
    fn test_text_format_goes_through_render_text() {
        let writer = OutputWriter::new(OutputFormat::Text);
        let mut buffer = Vec::new();
        writer
            .write_to(&mut buffer, &sample_report())
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Registered detectors (2):"));
        assert!(output.contains("cargo-lockfile"));
        assert!(output.contains("Cargo.lock"));
        // text output must not be JSON
        assert!(serde_json::from_str::<serde_json::Value>(&output).is_err());
    }

    #[test]
    fn test_json_format_emits_a_parseable_report() {
        let writer = OutputWriter::new(OutputFormat::Json);
        let mut buffer = Vec::new();
        writer
            .write_to(&mut buffer, &sample_report())
            .expect("json rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        let parsed: serde_json::Value =
            serde_json::from_str(&output).expect("output should be valid JSON");

        let detectors = parsed["detectors"].as_array().expect("detectors array");
        assert_eq!(detectors.len(), 2);
        assert_eq!(detectors[0]["id"].as_str(), Some("cargo-lockfile"));
        assert_eq!(detectors[1]["experimental"].as_bool(), Some(true));
    }

    #[test]
    fn test_json_format_is_pretty_printed_with_trailing_newline() {
        let writer = OutputWriter::new(OutputFormat::Json);
        let mut buffer = Vec::new();
        writer
            .write_to(&mut buffer, &sample_report())
            .expect("json rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.ends_with('\n'), "report should end with a newline");
        assert!(
            output.contains("\n  "),
            "json report should be indented for humans"
        );
    }
}
