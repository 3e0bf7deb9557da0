//! Reports: per-file defect lists, filtering and revision diffs.

use std::collections::{BTreeMap, BTreeSet};

use crate::defect::{CodeDefect, DefectSignature, Severity};

/// File name -> defects, files in lexicographic order.
pub type Report = BTreeMap<String, Vec<CodeDefect>>;

/// Threshold and ignore set applied by [`sort_and_filter_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFilter {
    pub report_level: Severity,
    pub ignored_codes: BTreeSet<String>,
}

impl Default for ReportFilter {
    fn default() -> Self {
        ReportFilter {
            report_level: Severity::Warning,
            ignored_codes: BTreeSet::new(),
        }
    }
}

impl ReportFilter {
    pub fn new(report_level: Severity) -> Self {
        ReportFilter {
            report_level,
            ignored_codes: BTreeSet::new(),
        }
    }

    pub fn ignore<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn accepts(&self, defect: &CodeDefect) -> bool {
        defect.severity >= self.report_level && !self.ignored_codes.contains(&defect.error_code)
    }
}

/// Drop defects below the threshold or with ignored codes, drop files left
/// empty, and order each file's defects by line (stable for equal lines).
pub fn sort_and_filter_report(report: Report, filter: &ReportFilter) -> Report {
    report
        .into_iter()
        .filter_map(|(file, defects)| {
            let mut kept: Vec<CodeDefect> =
                defects.into_iter().filter(|d| filter.accepts(d)).collect();
            if kept.is_empty() {
                return None;
            }
            kept.sort_by_key(|d| d.line_number);
            Some((file, kept))
        })
        .collect()
}

/// Defects of `new` whose signature does not occur in `old` for the same
/// file. Signatures are counted, so a second copy of a pre-existing defect
/// is still reported as new.
pub fn new_defects(old: &Report, new: &Report) -> Report {
    let mut out = Report::new();
    for (file, defects) in new {
        let mut budget: BTreeMap<DefectSignature, usize> = BTreeMap::new();
        if let Some(previous) = old.get(file) {
            for d in previous {
                *budget.entry(d.signature()).or_default() += 1;
            }
        }

        let added: Vec<CodeDefect> = defects
            .iter()
            .filter(|d| match budget.get_mut(&d.signature()) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    false
                }
                _ => true,
            })
            .cloned()
            .collect();

        if !added.is_empty() {
            out.insert(file.clone(), added);
        }
    }
    out
}

/// Total number of defects at or above `severity`.
pub fn count_at_least(report: &Report, severity: Severity) -> usize {
    report
        .values()
        .flatten()
        .filter(|d| d.severity >= severity)
        .count()
}
