//! Link database for cross-reference output.
//!
//! Documentation plugins register the objects they produce pages for (a
//! report id plus an object id) and mark token ranges in source files that
//! should link to those pages. A source range is stored as an `Open` entry at
//! its first token and a `Close` entry after its last token.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One boundary of a linked token range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceLink {
    Open { report_id: String, object_id: String },
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct LinkDatabase {
    objects: BTreeMap<String, BTreeSet<String>>,
    source_links: BTreeMap<String, BTreeMap<usize, Vec<SourceLink>>>,
}

impl LinkDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `report_id` has a page for `object_id`.
    pub fn add_report_object(&mut self, report_id: &str, object_id: &str) {
        self.objects
            .entry(report_id.to_string())
            .or_default()
            .insert(object_id.to_string());
    }

    pub fn has_report_object(&self, report_id: &str, object_id: &str) -> bool {
        self.objects
            .get(report_id)
            .is_some_and(|ids| ids.contains(object_id))
    }

    pub fn report_objects(&self, report_id: &str) -> impl Iterator<Item = &str> {
        self.objects
            .get(report_id)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// Link tokens `start..=end` of `file_name` to an object page.
    pub fn add_source_link(
        &mut self,
        file_name: &str,
        start: usize,
        end: usize,
        report_id: &str,
        object_id: &str,
    ) {
        let file = self.source_links.entry(file_name.to_string()).or_default();
        file.entry(start).or_default().push(SourceLink::Open {
            report_id: report_id.to_string(),
            object_id: object_id.to_string(),
        });
        file.entry(end + 1).or_default().push(SourceLink::Close);
    }

    /// Link boundaries of a file, ordered by token index.
    pub fn source_links(&self, file_name: &str) -> Vec<(usize, &[SourceLink])> {
        self.source_links
            .get(file_name)
            .map(|links| links.iter().map(|(i, v)| (*i, v.as_slice())).collect())
            .unwrap_or_default()
    }

    pub fn linked_files(&self) -> impl Iterator<Item = &str> {
        self.source_links.keys().map(String::as_str)
    }

    /// Relative link to a report page.
    ///
    /// With an object id: `<root><report>/<object file>[#anchor]`; without:
    /// `<root><report>.<ext>`.
    pub fn link_for(
        &self,
        report_id: &str,
        object_id: Option<&str>,
        root: &str,
        anchor: Option<&str>,
        extension: &str,
    ) -> String {
        let mut link = match object_id {
            Some(id) => format!(
                "{}{}/{}",
                root,
                report_id,
                file_name_for_object_id(id, extension)
            ),
            None => format!("{}{}.{}", root, report_id, extension),
        };
        if let Some(anchor) = anchor {
            link.push('#');
            link.push_str(anchor);
        }
        link
    }
}

/// File name for an object page: separators become `/`, anything outside
/// `[A-Za-z0-9./-]` becomes `-`, and `..` becomes `--`.
pub fn file_name_for_object_id(object_id: &str, extension: &str) -> String {
    let cleaned: String = object_id
        .chars()
        .map(|c| match c {
            '\\' => '/',
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '/' => c,
            _ => '-',
        })
        .collect();
    format!("{}.{}", cleaned.replace("..", "--"), extension)
}
