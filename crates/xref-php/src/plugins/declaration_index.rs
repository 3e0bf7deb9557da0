//! Declaration index: one JSON page per class and per free function, plus
//! source links from every declaration name to its page.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use xref_core::error::PluginError;
use xref_core::links::LinkDatabase;
use xref_core::model::Attributes;
use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::{DocumentPage, DocumentationPlugin, Plugin};

const PLUGIN_ID: &str = "php-doc-declarations";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MemberEntry {
    name: String,
    line_number: u32,
    visibility: &'static str,
    is_static: bool,
    is_abstract: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeclarationEntry {
    name: String,
    kind: &'static str,
    file_name: String,
    line_number: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extends: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    implements: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    uses: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    methods: Vec<MemberEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    properties: Vec<MemberEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<String>,
}

/// Accumulates declarations across files; the pages are produced once all
/// files have been seen.
#[derive(Debug, Default)]
pub struct DeclarationIndex {
    /// Object id -> every declaration with that name (duplicates included).
    entries: Mutex<BTreeMap<String, Vec<DeclarationEntry>>>,
}

impl DeclarationIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for DeclarationIndex {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Declaration index"
    }

    fn as_documentation(&self) -> Option<&dyn DocumentationPlugin> {
        Some(self)
    }
}

fn visibility(attributes: Attributes) -> &'static str {
    if attributes.is_private() {
        "private"
    } else if attributes.is_protected() {
        "protected"
    } else {
        "public"
    }
}

impl DocumentationPlugin for DeclarationIndex {
    fn generate_file_report(
        &self,
        pf: &ParsedFile,
        links: &mut LinkDatabase,
    ) -> Result<(), PluginError> {
        let mut found: Vec<(String, usize, DeclarationEntry)> = Vec::new();

        for class in pf.classes() {
            let Some(name_index) = class.name_index else {
                continue;
            };
            let methods = pf
                .methods_of(class)
                .filter_map(|m| {
                    Some(MemberEntry {
                        name: m.name.clone()?,
                        line_number: pf.line_number_at(m.index),
                        visibility: visibility(m.attributes),
                        is_static: m.attributes.is_static(),
                        is_abstract: m.attributes.is_abstract(),
                    })
                })
                .collect();
            let properties = class
                .properties
                .iter()
                .map(|p| MemberEntry {
                    name: p.name.clone(),
                    line_number: pf.line_number_at(p.index),
                    visibility: visibility(p.attributes),
                    is_static: p.attributes.is_static(),
                    is_abstract: false,
                })
                .collect();
            found.push((
                class.name.clone(),
                name_index,
                DeclarationEntry {
                    name: class.name.clone(),
                    kind: class.kind.as_str(),
                    file_name: pf.file_name().to_string(),
                    line_number: pf.line_number_at(class.index),
                    extends: class.extends.clone(),
                    implements: class.implements.clone(),
                    uses: class.uses.clone(),
                    methods,
                    properties,
                    parameters: Vec::new(),
                },
            ));
        }

        for function in pf.functions().iter().filter(|f| f.class_id.is_none()) {
            let (Some(name), Some(name_index)) = (&function.name, function.name_index) else {
                continue;
            };
            found.push((
                name.clone(),
                name_index,
                DeclarationEntry {
                    name: name.clone(),
                    kind: "function",
                    file_name: pf.file_name().to_string(),
                    line_number: pf.line_number_at(function.index),
                    extends: Vec::new(),
                    implements: Vec::new(),
                    uses: Vec::new(),
                    methods: Vec::new(),
                    properties: Vec::new(),
                    parameters: function.parameters.iter().map(|p| p.name.clone()).collect(),
                },
            ));
        }

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| PluginError::new(PLUGIN_ID, "declaration index lock poisoned"))?;
        for (object_id, name_index, entry) in found {
            links.add_source_link(pf.file_name(), name_index, name_index, PLUGIN_ID, &object_id);
            entries.entry(object_id).or_default().push(entry);
        }
        Ok(())
    }

    fn generate_total_report(&self) -> Result<Vec<DocumentPage>, PluginError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| PluginError::new(PLUGIN_ID, "declaration index lock poisoned"))?;
        entries
            .iter()
            .map(|(object_id, declarations)| {
                let content = serde_json::to_string_pretty(declarations)
                    .map_err(|e| PluginError::new(PLUGIN_ID, e.to_string()))?;
                Ok(DocumentPage {
                    object_id: object_id.clone(),
                    content,
                })
            })
            .collect()
    }

    fn report_link(&self, links: &LinkDatabase, object_id: &str, root: &str) -> Option<String> {
        links
            .has_report_object(PLUGIN_ID, object_id)
            .then(|| links.link_for(PLUGIN_ID, Some(object_id), root, None, "json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::test_support::parse;
    use xref_core::links::SourceLink;

    #[test]
    fn pages_and_links() {
        let index = DeclarationIndex::new();
        let mut links = LinkDatabase::new();
        let pf = parse("<?php namespace N;\nclass A { private $p; public static function f() {} }\nfunction g($x) {}");
        index.generate_file_report(&pf, &mut links).unwrap();

        let pages = index.generate_total_report().unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p.object_id.as_str()).collect();
        assert_eq!(ids, vec!["N\\A", "N\\g"]);

        let class_page: serde_json::Value = serde_json::from_str(&pages[0].content).unwrap();
        assert_eq!(class_page[0]["kind"], "class");
        assert_eq!(class_page[0]["lineNumber"], 2);
        assert_eq!(class_page[0]["methods"][0]["isStatic"], true);
        assert_eq!(class_page[0]["properties"][0]["visibility"], "private");

        let source = links.source_links("test.php");
        assert_eq!(source.len(), 4);
        assert!(matches!(&source[0].1[0], SourceLink::Open { object_id, .. } if object_id == "N\\A"));
        assert_eq!(source[1].1, &[SourceLink::Close]);
    }

    #[test]
    fn report_link_requires_a_registered_object() {
        let index = DeclarationIndex::new();
        let mut links = LinkDatabase::new();
        assert_eq!(index.report_link(&links, "N\\A", "../"), None);
        links.add_report_object(PLUGIN_ID, "N\\A");
        assert_eq!(
            index.report_link(&links, "N\\A", "../").as_deref(),
            Some("../php-doc-declarations/N/A.json")
        );
    }
}
