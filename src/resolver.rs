//! Shared name-matching heuristics.
//!
//! Metadata file-naming conventions are inconsistent, so parent lookup is an
//! ordered fallback chain: exact case-insensitive match, match after
//! stripping the form/version prefix (`md25equipmentCategory` →
//! `equipmentCategory`), then substring containment with shorter stems
//! preferred. The detector, the form generator, and the integrity validator
//! all resolve through this one component so the heuristics cannot drift
//! apart per caller.

use std::sync::OnceLock;

use heck::{ToLowerCamelCase, ToSnakeCase};
use log::debug;
use regex::Regex;

/// Column suffix/prefix patterns that mark a reference-candidate column.
const REFERENCE_SUFFIXES: &[&str] = &["_category", "_type", "_group"];

const FK_SUFFIX: &str = "_code";

fn form_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]+[0-9]+").unwrap())
}

/// True when a column name looks like it references another lookup table:
/// `*_category`, `*_type`, `*_group`, `parent_*`, or `*_parent`.
pub fn is_reference_candidate(column: &str) -> bool {
    if column == "id" || column == "code" || column == "name" {
        return false;
    }
    REFERENCE_SUFFIXES.iter().any(|s| column.ends_with(s))
        || column.starts_with("parent_")
        || column.ends_with("_parent")
}

/// Strips the reference suffix/prefix from a candidate column, yielding the
/// stem used to search for a parent file (`crop_category` → `crop`).
pub fn strip_reference_marker(column: &str) -> &str {
    for suffix in REFERENCE_SUFFIXES {
        if let Some(stripped) = column.strip_suffix(suffix) {
            return stripped;
        }
    }
    if let Some(stripped) = column.strip_prefix("parent_") {
        return stripped;
    }
    if let Some(stripped) = column.strip_suffix("_parent") {
        return stripped;
    }
    column
}

/// Removes a leading form/version token such as `md25` from a file stem.
pub fn strip_form_prefix(stem: &str) -> &str {
    match form_prefix_re().find(stem) {
        Some(m) if m.end() < stem.len() => &stem[m.end()..],
        _ => stem,
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    Exact,
    PrefixStripped,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub stem: String,
    pub confidence: MatchConfidence,
}

/// Resolves `target` (a column-derived or mapping-supplied name) against the
/// set of scanned file stems. Returns `None` when no heuristic matches.
pub fn resolve_name(target: &str, known_stems: &[String]) -> Option<ResolvedName> {
    let wanted = normalize(target);
    if wanted.is_empty() {
        return None;
    }

    for stem in known_stems {
        if normalize(stem) == wanted {
            return Some(ResolvedName {
                stem: stem.clone(),
                confidence: MatchConfidence::Exact,
            });
        }
    }

    for stem in known_stems {
        if normalize(strip_form_prefix(stem)) == wanted {
            return Some(ResolvedName {
                stem: stem.clone(),
                confidence: MatchConfidence::PrefixStripped,
            });
        }
    }

    // Substring containment, either direction. Shorter stems win so that a
    // column stem like `crop` binds to `md19crops` before `md19cropsDetail`.
    let mut candidates: Vec<&String> = known_stems
        .iter()
        .filter(|stem| {
            let normalized = normalize(strip_form_prefix(stem));
            normalized.contains(&wanted) || wanted.contains(&normalized)
        })
        .collect();
    candidates.sort_by_key(|stem| stem.len());
    if let Some(stem) = candidates.first() {
        debug!("Low-confidence substring match: '{target}' -> '{stem}'");
        return Some(ResolvedName {
            stem: (*stem).clone(),
            confidence: MatchConfidence::Substring,
        });
    }
    None
}

/// Derives the reference-field name injected into a Pattern-2 child form:
/// strip the form/version prefix, snake_case the remainder, ensure the
/// `_code` suffix (`md25equipmentCategory` → `equipment_category_code`).
pub fn derive_fk_name(parent_stem: &str) -> String {
    let base = strip_form_prefix(parent_stem).to_snake_case();
    if base.ends_with(FK_SUFFIX) {
        base
    } else {
        format!("{base}{FK_SUFFIX}")
    }
}

/// Last-resort parent-form id derived from a reference column when no scanned
/// file matched (`crop_category` → `crop`, camel-cased).
pub fn camel_case_fallback(column: &str) -> String {
    strip_reference_marker(column).to_lower_camel_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stems(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn reference_candidates_match_suffix_and_parent_patterns() {
        assert!(is_reference_candidate("crop_category"));
        assert!(is_reference_candidate("equipment_type"));
        assert!(is_reference_candidate("soil_group"));
        assert!(is_reference_candidate("parent_region"));
        assert!(is_reference_candidate("region_parent"));
        assert!(!is_reference_candidate("code"));
        assert!(!is_reference_candidate("name"));
        assert!(!is_reference_candidate("description"));
    }

    #[test]
    fn strip_form_prefix_keeps_stem_without_version_token() {
        assert_eq!(strip_form_prefix("md25equipmentCategory"), "equipmentCategory");
        assert_eq!(strip_form_prefix("equipmentCategory"), "equipmentCategory");
        // A stem that is only a prefix token stays intact.
        assert_eq!(strip_form_prefix("md25"), "md25");
    }

    #[test]
    fn resolve_name_prefers_exact_then_stripped_then_substring() {
        let known = stems(&["md19crops", "md25equipmentCategory", "md19cropsDetail"]);

        let exact = resolve_name("md19crops", &known).unwrap();
        assert_eq!(exact.confidence, MatchConfidence::Exact);

        let stripped = resolve_name("equipmentCategory", &known).unwrap();
        assert_eq!(stripped.stem, "md25equipmentCategory");
        assert_eq!(stripped.confidence, MatchConfidence::PrefixStripped);

        let substring = resolve_name("crop", &known).unwrap();
        assert_eq!(substring.stem, "md19crops");
        assert_eq!(substring.confidence, MatchConfidence::Substring);

        assert!(resolve_name("livestock", &known).is_none());
    }

    #[test]
    fn derive_fk_name_strips_prefix_and_appends_code() {
        assert_eq!(derive_fk_name("md25equipmentCategory"), "equipment_category_code");
        assert_eq!(derive_fk_name("regionCode"), "region_code");
    }

    #[test]
    fn camel_case_fallback_uses_column_stem() {
        assert_eq!(camel_case_fallback("crop_category"), "crop");
        assert_eq!(camel_case_fallback("equipment_sub_type"), "equipmentSub");
    }
}
