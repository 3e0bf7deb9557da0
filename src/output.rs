//! Report rendering: text and JSON.

use std::collections::BTreeMap;
use std::io::{self, Write};

use console::Style;
use serde::Serialize;

use xref_core::defect::Severity;
use xref_core::engine::EngineStats;
use xref_core::plugin::ErrorDescription;
use xref_core::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Line style for a severity. Styling is forced: the caller has already
/// resolved `lint.color` against the terminal.
fn style_of(severity: Severity) -> Style {
    let style = match severity {
        Severity::Fatal | Severity::Error => Style::new().red(),
        Severity::Warning => Style::new().yellow(),
        Severity::Notice => Style::new().green(),
    };
    style.force_styling(true)
}

// ============================================================================
// Summary
// ============================================================================

/// Defect counts of a final report. Fatal defects count as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub files_with_defects: usize,
    pub errors: usize,
    pub warnings: usize,
    pub notices: usize,
}

impl ReportSummary {
    pub fn of(report: &Report) -> Self {
        let mut summary = ReportSummary::default();
        for defects in report.values() {
            if defects.is_empty() {
                continue;
            }
            summary.files_with_defects += 1;
            for defect in defects {
                match defect.severity {
                    Severity::Notice => summary.notices += 1,
                    Severity::Warning => summary.warnings += 1,
                    Severity::Error | Severity::Fatal => summary.errors += 1,
                }
            }
        }
        summary
    }

    /// 1 when errors or warnings remain, 0 otherwise.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.errors + self.warnings > 0)
    }
}

// ============================================================================
// Writers
// ============================================================================

/// `File: <name>` followed by one line per defect.
pub fn write_text<W: Write>(report: &Report, color: bool, out: &mut W) -> io::Result<()> {
    for (file_name, defects) in report {
        writeln!(out, "File: {}", file_name)?;
        for defect in defects {
            let line = format!(
                "    line {:4}: {:<8} ({}): {}",
                defect.line_number,
                defect.severity.as_str(),
                defect.error_code,
                defect.message
            );
            if color {
                writeln!(out, "{}", style_of(defect.severity).apply_to(&line))?;
            } else {
                writeln!(out, "{}", line)?;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonDefect<'a> {
    file_name: &'a str,
    line_number: u32,
    token_text: &'a str,
    severity_str: &'a str,
    error_code: &'a str,
    message: &'a str,
}

/// One JSON array of every defect, in report order.
pub fn write_json<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    let rows: Vec<JsonDefect<'_>> = report
        .iter()
        .flat_map(|(file_name, defects)| {
            defects.iter().map(move |d| JsonDefect {
                file_name,
                line_number: d.line_number,
                token_text: &d.token_text,
                severity_str: d.severity.as_str(),
                error_code: &d.error_code,
                message: &d.message,
            })
        })
        .collect();
    serde_json::to_writer(&mut *out, &rows).map_err(io::Error::other)?;
    writeln!(out)
}

pub fn write_report<W: Write>(
    report: &Report,
    format: OutputFormat,
    color: bool,
    out: &mut W,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => write_text(report, color, out),
        OutputFormat::Json => write_json(report, out),
    }
}

/// Engine counters and defect totals, for `--verbose`.
pub fn write_stats<W: Write>(stats: &EngineStats, summary: &ReportSummary, out: &mut W) -> io::Result<()> {
    writeln!(out, "Total files:          {}", stats.total_files)?;
    writeln!(out, "Files parsed:         {}", stats.parsed_files)?;
    writeln!(out, "Cache hits:           {}", stats.cache_hits)?;
    writeln!(out, "Files with defects:   {}", summary.files_with_defects)?;
    writeln!(out, "Errors:               {}", summary.errors)?;
    writeln!(out, "Warnings:             {}", summary.warnings)?;
    writeln!(out, "Notices:              {}", summary.notices)
}

/// Table of every known error code.
pub fn write_error_map<W: Write>(
    map: &BTreeMap<String, ErrorDescription>,
    format: OutputFormat,
    out: &mut W,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => {
            for desc in map.values() {
                writeln!(out, "{:<8} {:<8} {}", desc.code, desc.severity.as_str(), desc.message)?;
            }
            Ok(())
        }
        OutputFormat::Json => {
            let rows: Vec<&ErrorDescription> = map.values().collect();
            serde_json::to_writer_pretty(&mut *out, &rows).map_err(io::Error::other)?;
            writeln!(out)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use xref_core::defect::CodeDefect;

    fn sample() -> Report {
        let mut report = Report::new();
        report.insert(
            "src/a.php".to_string(),
            vec![
                CodeDefect::detached("src/a.php", 7, "$x", "uv01", Severity::Warning, "Variable is assigned but never used"),
                CodeDefect::detached("src/a.php", 12, "TRUE", "lc01", Severity::Notice, "Literal is not lower case"),
            ],
        );
        report.insert(
            "(project)".to_string(),
            vec![CodeDefect::detached("(project)", 0, "App\\User", "xr003", Severity::Error, "Class is declared more than once")],
        );
        report
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn text_layout() {
        let text = render(|out| write_text(&sample(), false, out));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "File: (project)");
        assert_eq!(lines[1], "    line    0: error    (xr003): Class is declared more than once");
        assert_eq!(lines[2], "File: src/a.php");
        assert_eq!(lines[3], "    line    7: warning  (uv01): Variable is assigned but never used");
        assert_eq!(lines[4], "    line   12: notice   (lc01): Literal is not lower case");
    }

    #[test]
    fn text_colors_wrap_each_line() {
        let plain = render(|out| write_text(&sample(), false, out));
        let colored = render(|out| write_text(&sample(), true, out));
        let plain: Vec<&str> = plain.lines().collect();
        let lines: Vec<&str> = colored.lines().collect();
        assert_eq!(lines[0], "File: (project)");
        assert_eq!(lines[1], Style::new().red().force_styling(true).apply_to(plain[1]).to_string());
        assert_eq!(lines[3], Style::new().yellow().force_styling(true).apply_to(plain[3]).to_string());
        assert_eq!(lines[4], Style::new().green().force_styling(true).apply_to(plain[4]).to_string());
        assert!(lines[1].starts_with('\x1b') && lines[1].contains(plain[1]));
    }

    #[test]
    fn color_off_emits_no_escape_sequences() {
        let text = render(|out| write_text(&sample(), false, out));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn json_rows() {
        let text = render(|out| write_json(&sample(), out));
        let rows: serde_json::Value = serde_json::from_str(&text).unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1]["fileName"], "src/a.php");
        assert_eq!(rows[1]["lineNumber"], 7);
        assert_eq!(rows[1]["tokenText"], "$x");
        assert_eq!(rows[1]["severityStr"], "warning");
        assert_eq!(rows[1]["errorCode"], "uv01");
    }

    #[test]
    fn empty_json_report_is_an_empty_array() {
        assert_eq!(render(|out| write_json(&Report::new(), out)), "[]\n");
    }

    #[test]
    fn summary_and_exit_code() {
        let summary = ReportSummary::of(&sample());
        assert_eq!(
            summary,
            ReportSummary {
                files_with_defects: 2,
                errors: 1,
                warnings: 1,
                notices: 1
            }
        );
        assert_eq!(summary.exit_code(), 1);

        let mut notices_only = sample();
        notices_only.remove("(project)");
        notices_only.get_mut("src/a.php").unwrap().remove(0);
        assert_eq!(ReportSummary::of(&notices_only).exit_code(), 0);
    }

    #[test]
    fn stats_block() {
        let stats = EngineStats {
            total_files: 3,
            parsed_files: 1,
            cache_hits: 2,
        };
        let text = render(|out| write_stats(&stats, &ReportSummary::of(&sample()), out));
        assert!(text.contains("Cache hits:           2\n"));
        assert!(text.ends_with("Notices:              1\n"));
    }
}
