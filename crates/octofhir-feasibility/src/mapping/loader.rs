//! Loading mappings and the expansion tree from JSON files.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use super::context::MappingContext;
use super::model::Mapping;
use super::tree::MappingTree;
use crate::error::{FeasibilityError, Result};

/// Load a JSON array of term code mappings.
pub fn load_mappings(path: &Path) -> Result<Vec<Mapping>> {
    read_json(path)
}

/// Load an expansion tree.
pub fn load_tree(path: &Path) -> Result<MappingTree> {
    read_json(path)
}

impl MappingContext {
    /// Build a context from a mapping file and an optional expansion tree file.
    pub fn load(mapping_file: &Path, tree_file: Option<&Path>) -> Result<Self> {
        let mappings = load_mappings(mapping_file)?;
        let tree = tree_file.map(load_tree).transpose()?;

        let context = Self::new(mappings, tree);
        tracing::info!(
            mappings = context.len(),
            tree = context.has_tree(),
            path = %mapping_file.display(),
            "Loaded term code mappings"
        );
        Ok(context)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let load_error = |message: String| FeasibilityError::MappingLoad {
        path: path.display().to_string(),
        message,
    };
    let content = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_core::{Concept, ContextualConcept, TermCode};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MAPPINGS: &str = r#"[
        {
            "key": {"system": "http://fhir.de/CodeSystem/bfarm/icd-10-gm", "code": "C71", "display": "Brain"},
            "context": {"system": "fdpg.mii.cds", "code": "Diagnose", "display": "Diagnose"},
            "resourceType": "Condition",
            "termCodeSearchParameter": "code"
        }
    ]"#;

    const TREE: &str = r#"{"moduleRoots": [{
        "context": {"system": "fdpg.mii.cds", "code": "Diagnose", "display": "Diagnose"},
        "system": "http://fhir.de/CodeSystem/bfarm/icd-10-gm",
        "entries": [{"key": "C70-C72", "children": ["C71"], "abstract": true}]
    }]}"#;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_context_with_tree() {
        let mappings = write(MAPPINGS);
        let tree = write(TREE);

        let ctx = MappingContext::load(mappings.path(), Some(tree.path())).unwrap();
        assert_eq!(ctx.len(), 1);
        assert!(ctx.has_tree());

        let concept = ContextualConcept::new(
            TermCode::new("fdpg.mii.cds", "Diagnose", ""),
            Concept::of(TermCode::new("http://fhir.de/CodeSystem/bfarm/icd-10-gm", "C70-C72", "")),
        );
        let codes = ctx.expand_concept(&concept).unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "C71");
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let broken = write("{not json");
        let err = load_mappings(broken.path()).unwrap_err();
        match err {
            FeasibilityError::MappingLoad { path, .. } => {
                assert_eq!(path, broken.path().display().to_string())
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let missing = Path::new("/nonexistent/mapping.json");
        assert!(matches!(
            MappingContext::load(missing, None),
            Err(FeasibilityError::MappingLoad { .. })
        ));
    }
}
