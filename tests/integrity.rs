mod common;

use std::collections::BTreeSet;

use common::TestWorkspace;
use formcast::integrity::{
    IntegrityClass, IntegrityThresholds, audit, classify_overlap,
};
use formcast::metadata;
use proptest::prelude::*;

#[test]
fn unresolvable_parent_is_reported_as_missing_parent() {
    let ws = TestWorkspace::new();
    let data_dir = ws.dir("metadata");
    ws.write(
        "metadata/md19crops.csv",
        "code,crop_category,name\nWHEAT,\"Cereal crops grown in winter\",Wheat\n",
    );
    let files = metadata::scan_directory(&data_dir, None).expect("scan");
    let findings = audit(&files, None, &IntegrityThresholds::default()).expect("audit");
    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.classification, IntegrityClass::MissingParent);
    assert!(finding.parent_form.is_none());
    assert!(finding.recommendation.contains("false positive"));
    assert_eq!(finding.match_pct, 0.0);
}

#[test]
fn sound_reference_is_valid_and_mismatch_is_broken() {
    let ws = TestWorkspace::new();
    let data_dir = ws.dir("metadata");
    ws.write(
        "metadata/md19cropCategory.csv",
        "code,name\nCEREAL,Cereal\nROOT,Root\nFRUIT,Fruit\nLEGUME,Legume\n",
    );
    ws.write(
        "metadata/md19crops.csv",
        "code,crop_category,name\n\
         WHEAT,CEREAL,Wheat\n\
         BARLEY,ROOT,Barley\n\
         APPLE,FRUIT,Apple\n\
         PEA,LEGUME,Pea\n\
         MAIZE,TYPO,Maize\n",
    );
    let files = metadata::scan_directory(&data_dir, None).expect("scan");
    let findings = audit(&files, None, &IntegrityThresholds::default()).expect("audit");
    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    // 4 of 5 distinct values resolve: 80% sits on the BROKEN floor.
    assert_eq!(finding.classification, IntegrityClass::Broken);
    assert_eq!(finding.match_pct, 80.0);
    assert_eq!(finding.missing_values, vec!["TYPO".to_string()]);
    assert_eq!(finding.parent_form.as_deref(), Some("md19cropCategory"));
}

#[test]
fn audit_ignores_code_and_name_columns() {
    let ws = TestWorkspace::new();
    let data_dir = ws.dir("metadata");
    ws.write("metadata/md25soils.csv", "code,name\nLOAM,Loam\n");
    let files = metadata::scan_directory(&data_dir, None).expect("scan");
    let findings = audit(&files, None, &IntegrityThresholds::default()).expect("audit");
    assert!(findings.is_empty());
}

fn value_set(values: &[String]) -> BTreeSet<String> {
    values.iter().cloned().collect()
}

proptest! {
    /// Classification is a pure function of the two distinct-value sets:
    /// subset → VALID, zero overlap → FALSE_POSITIVE, and the verdict never
    /// depends on anything but the overlap ratio.
    #[test]
    fn subset_children_always_classify_valid(
        parent in prop::collection::btree_set("[A-Z]{3,8}", 1..20),
        pick in prop::collection::vec(any::<prop::sample::Index>(), 1..10),
    ) {
        let parent_vec: Vec<String> = parent.iter().cloned().collect();
        let child: BTreeSet<String> = pick
            .iter()
            .map(|idx| idx.get(&parent_vec).clone())
            .collect();
        let (pct, missing, class) =
            classify_overlap(&child, &parent, &IntegrityThresholds::default());
        prop_assert_eq!(class, IntegrityClass::Valid);
        prop_assert_eq!(pct, 100.0);
        prop_assert!(missing.is_empty());
    }

    #[test]
    fn disjoint_children_always_classify_false_positive(
        child in prop::collection::vec("[a-z]{3,8}", 1..10),
        parent in prop::collection::vec("[A-Z]{3,8}", 0..10),
    ) {
        let child = value_set(&child);
        let parent = value_set(&parent);
        // Lowercase child values can never match uppercase parent keys.
        let (pct, missing, class) =
            classify_overlap(&child, &parent, &IntegrityThresholds::default());
        prop_assert_eq!(class, IntegrityClass::FalsePositive);
        prop_assert_eq!(pct, 0.0);
        prop_assert_eq!(missing.len(), child.len());
    }
}
