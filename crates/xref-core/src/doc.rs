//! Documentation runner.
//!
//! Feeds every parseable file to the registered documentation plugins, then
//! collects their total reports and records each produced page in the link
//! database. Writing is separate so callers can inspect the output first.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::defect::{CodeDefect, Severity, ERROR_CODE_CANT_PARSE_FILE, PROJECT_FILE_NAME};
use crate::engine::plugin_failure;
use crate::error::XrefError;
use crate::file_provider::FileProvider;
use crate::links::{file_name_for_object_id, LinkDatabase, SourceLink};
use crate::plugin::DocumentPage;
use crate::registry::PluginRegistry;

/// Everything the documentation plugins produced in one run.
#[derive(Debug, Default)]
pub struct DocumentationOutput {
    /// Report id -> pages.
    pub pages: BTreeMap<String, Vec<DocumentPage>>,
    pub links: LinkDatabase,
    /// Files that could not be parsed and plugins that failed.
    pub problems: Vec<CodeDefect>,
}

pub fn generate_documentation(
    registry: &PluginRegistry,
    provider: &dyn FileProvider,
) -> Result<DocumentationOutput, XrefError> {
    let plugins = registry.documentation_plugins();
    let mut output = DocumentationOutput::default();

    for file_name in provider.file_list()? {
        if !registry.can_parse(&file_name) {
            continue;
        }
        let content = match provider.file_content(&file_name) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %file_name, error = %e, "cannot read file, skipping");
                continue;
            }
        };
        let pf = match registry.parse_file(&file_name, &content) {
            Ok(pf) => pf,
            Err(e) => {
                output.problems.push(CodeDefect::detached(
                    &file_name,
                    e.line_number,
                    "",
                    ERROR_CODE_CANT_PARSE_FILE,
                    Severity::Fatal,
                    format!("Can't parse file ({})", e.message),
                ));
                continue;
            }
        };
        for (plugin_id, plugin) in &plugins {
            if let Err(e) = plugin.generate_file_report(&pf, &mut output.links) {
                output
                    .problems
                    .push(plugin_failure(&file_name, plugin_id, &e.message));
            }
        }
    }

    for (plugin_id, plugin) in &plugins {
        match plugin.generate_total_report() {
            Ok(pages) => {
                for page in &pages {
                    output.links.add_report_object(plugin_id, &page.object_id);
                }
                debug!(plugin = plugin_id, pages = pages.len(), "documentation generated");
                output
                    .pages
                    .entry(plugin_id.to_string())
                    .or_default()
                    .extend(pages);
            }
            Err(e) => output
                .problems
                .push(plugin_failure(PROJECT_FILE_NAME, plugin_id, &e.message)),
        }
    }

    Ok(output)
}

#[derive(Serialize)]
struct LinkIndexEntry<'a> {
    index: usize,
    links: &'a [SourceLink],
}

/// Write pages under `dir/<report id>/` and the source link index to
/// `dir/links.json`. Returns the written paths.
pub fn write_documentation(
    output: &DocumentationOutput,
    dir: &Path,
    extension: &str,
) -> io::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (report_id, pages) in &output.pages {
        for page in pages {
            let path = dir
                .join(report_id)
                .join(file_name_for_object_id(&page.object_id, extension));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &page.content)?;
            written.push(path);
        }
    }

    let index: BTreeMap<&str, Vec<LinkIndexEntry<'_>>> = output
        .links
        .linked_files()
        .map(|file| {
            let entries = output
                .links
                .source_links(file)
                .into_iter()
                .map(|(index, links)| LinkIndexEntry { index, links })
                .collect();
            (file, entries)
        })
        .collect();
    fs::create_dir_all(dir)?;
    let path = dir.join("links.json");
    let json = serde_json::to_string_pretty(&index).map_err(io::Error::other)?;
    fs::write(&path, json)?;
    written.push(path);
    Ok(written)
}
