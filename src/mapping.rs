//! Category-mapping configuration: `parent-file → {category-value → child-file}`.
//!
//! The mapping is authored externally (YAML or JSON) and drives Pattern-2
//! (injected-reference) detection. A file's presence here overrides any
//! column-based heuristic for that file.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryMapping {
    #[serde(flatten)]
    pub parents: BTreeMap<String, BTreeMap<String, String>>,
}

impl CategoryMapping {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Reading category mapping {path:?}"))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mapping = if is_json {
            serde_json::from_str(&raw)
                .with_context(|| format!("Parsing category mapping JSON {path:?}"))?
        } else {
            serde_yaml::from_str(&raw)
                .with_context(|| format!("Parsing category mapping YAML {path:?}"))?
        };
        Ok(mapping)
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Looks up whether `child_stem` is declared as a child anywhere in the
    /// mapping; returns the parent stem and the category value to inject.
    pub fn parent_of(&self, child_stem: &str) -> Option<(&str, &str)> {
        for (parent, children) in &self.parents {
            for (value, child) in children {
                if child == child_stem {
                    return Some((parent.as_str(), value.as_str()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_lookup_finds_declared_child() {
        let yaml = "md25equipmentCategory:\n  TILLAGE: md25tillageEquipment\n";
        let mapping: CategoryMapping = serde_yaml::from_str(yaml).unwrap();
        let (parent, value) = mapping.parent_of("md25tillageEquipment").unwrap();
        assert_eq!(parent, "md25equipmentCategory");
        assert_eq!(value, "TILLAGE");
        assert!(mapping.parent_of("md25crops").is_none());
        assert!(!mapping.is_empty());
        assert!(CategoryMapping::default().is_empty());
    }
}
