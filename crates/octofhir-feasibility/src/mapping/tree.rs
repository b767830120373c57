//! Concept expansion tree.
//!
//! The tree is split into modules, one per `(context, system)` pair. Each module
//! lists entries by code; an entry names its children and whether it is
//! abstract. Expanding a code yields the code itself unless it is abstract,
//! followed by the expansion of each child in declared order. Children without an
//! entry of their own are leaves. Duplicates reachable over several branches are
//! kept.

use indexmap::IndexMap;
use octofhir_core::TermCode;
use serde::{Deserialize, Serialize};

/// One node of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display: String,

    #[serde(default)]
    pub children: Vec<String>,

    /// Abstract entries group their children but are never searched themselves
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
}

impl TreeEntry {
    pub fn normal(key: impl Into<String>, children: &[&str]) -> Self {
        Self {
            key: key.into(),
            display: String::new(),
            children: children.iter().map(|c| c.to_string()).collect(),
            is_abstract: false,
        }
    }

    pub fn abstract_node(key: impl Into<String>, children: &[&str]) -> Self {
        Self {
            is_abstract: true,
            ..Self::normal(key, children)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModuleRootJson {
    context: TermCode,
    system: String,
    #[serde(default)]
    entries: Vec<TreeEntry>,
}

/// All entries of one code system within one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ModuleRootJson", into = "ModuleRootJson")]
pub struct ModuleRoot {
    pub context: TermCode,
    pub system: String,
    entries: IndexMap<String, TreeEntry>,
}

impl ModuleRoot {
    pub fn new(context: TermCode, system: impl Into<String>, entries: Vec<TreeEntry>) -> Self {
        let system = system.into();
        let mut indexed = IndexMap::with_capacity(entries.len());
        for entry in entries {
            if indexed.contains_key(&entry.key) {
                tracing::warn!(system = %system, code = %entry.key, "Duplicate expansion tree entry, keeping the last one");
            }
            indexed.insert(entry.key.clone(), entry);
        }
        Self {
            context,
            system,
            entries: indexed,
        }
    }

    pub fn entry(&self, code: &str) -> Option<&TreeEntry> {
        self.entries.get(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matches(&self, context: &TermCode, term_code: &TermCode) -> bool {
        &self.context == context && self.system == term_code.system
    }

    fn term_code(&self, code: &str, display: &str) -> TermCode {
        TermCode::new(self.system.clone(), code, display)
    }

    fn expand_into(&self, code: &str, display: &str, path: &mut Vec<String>, out: &mut Vec<TermCode>) {
        if path.iter().any(|visited| visited == code) {
            tracing::warn!(system = %self.system, code, "Cycle in expansion tree, skipping repeated node");
            return;
        }

        let Some(entry) = self.entry(code) else {
            out.push(self.term_code(code, display));
            return;
        };

        if !entry.is_abstract {
            let display = if entry.display.is_empty() {
                display
            } else {
                entry.display.as_str()
            };
            out.push(self.term_code(code, display));
        }

        path.push(code.to_string());
        for child in &entry.children {
            let child_display = self.entry(child).map(|e| e.display.as_str()).unwrap_or("");
            self.expand_into(child, child_display, path, out);
        }
        path.pop();
    }
}

impl From<ModuleRootJson> for ModuleRoot {
    fn from(json: ModuleRootJson) -> Self {
        Self::new(json.context, json.system, json.entries)
    }
}

impl From<ModuleRoot> for ModuleRootJson {
    fn from(root: ModuleRoot) -> Self {
        Self {
            context: root.context,
            system: root.system,
            entries: root.entries.into_values().collect(),
        }
    }
}

/// The concept expansion tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTree {
    pub module_roots: Vec<ModuleRoot>,
}

impl MappingTree {
    pub fn new(module_roots: Vec<ModuleRoot>) -> Self {
        Self { module_roots }
    }

    /// Expand `term_code` within `context` into the codes to search for.
    ///
    /// Returns `None` when no module covers the context and code system.
    pub fn expand(&self, context: &TermCode, term_code: &TermCode) -> Option<Vec<TermCode>> {
        let module = self
            .module_roots
            .iter()
            .find(|root| root.matches(context, term_code))?;

        let mut out = Vec::new();
        module.expand_into(&term_code.code, &term_code.display, &mut Vec::new(), &mut out);
        Some(out)
    }
}
