//! Plain-text console rendering for scan, detection, and audit output.

use std::fmt::Write as _;

use crate::{
    integrity::{IntegrityClass, NestedLovReference},
    relationship::Hierarchy,
    structure::{CsvStructure, FormKind},
};

/// Number of missing values shown per integrity finding before eliding.
const MISSING_VALUE_DISPLAY_LIMIT: usize = 5;

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let format_row = |cells: &[String]| -> String {
        let mut line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let width = *width;
                format!("{cell:<width$}")
            })
            .collect::<Vec<_>>()
            .join("  ");
        while line.ends_with(' ') {
            line.pop();
        }
        line
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let _ = writeln!(output, "{}", format_row(&header_cells));
    let separators: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", format_row(&separators));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row));
    }
    output
}

fn class_label(class: IntegrityClass) -> &'static str {
    match class {
        IntegrityClass::Valid => "VALID",
        IntegrityClass::FalsePositive => "FALSE_POSITIVE",
        IntegrityClass::MissingParent => "MISSING_PARENT",
        IntegrityClass::Broken => "BROKEN",
    }
}

fn kind_label(kind: FormKind) -> &'static str {
    match kind {
        FormKind::Simple => "simple",
        FormKind::MultiField => "multi-field",
        FormKind::Reference => "reference",
        FormKind::InjectedReference => "injected-reference",
    }
}

pub fn render_structures(structures: &[(CsvStructure, usize, String)]) -> String {
    let rows: Vec<Vec<String>> = structures
        .iter()
        .map(|(structure, record_count, primary_key)| {
            vec![
                structure.stem.clone(),
                kind_label(structure.kind).to_string(),
                primary_key.clone(),
                structure
                    .reference_column
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
                record_count.to_string(),
            ]
        })
        .collect();
    render_table(&["file", "kind", "primary key", "reference column", "records"], &rows)
}

pub fn render_hierarchies(hierarchies: &[Hierarchy]) -> String {
    let rows: Vec<Vec<String>> = hierarchies
        .iter()
        .map(|h| {
            vec![
                h.name.clone(),
                format!("{:?}", h.pattern_type),
                h.parent_form.clone(),
                h.children.join(", "),
            ]
        })
        .collect();
    render_table(&["hierarchy", "pattern", "parent", "children"], &rows)
}

pub fn render_findings(findings: &[NestedLovReference]) -> String {
    let rows: Vec<Vec<String>> = findings
        .iter()
        .map(|finding| {
            let mut missing = finding
                .missing_values
                .iter()
                .take(MISSING_VALUE_DISPLAY_LIMIT)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if finding.missing_values.len() > MISSING_VALUE_DISPLAY_LIMIT {
                let _ = write!(
                    missing,
                    " (+{} more)",
                    finding.missing_values.len() - MISSING_VALUE_DISPLAY_LIMIT
                );
            }
            vec![
                finding.child_form.clone(),
                finding.column.clone(),
                finding
                    .parent_form
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
                format!("{:.1}%", finding.match_pct),
                class_label(finding.classification).to_string(),
                missing,
                finding.recommendation.clone(),
            ]
        })
        .collect();
    render_table(
        &["file", "column", "parent", "match", "class", "missing", "recommendation"],
        &rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_columns_and_trims_trailing_spaces() {
        let rows = vec![
            vec!["md19crops".to_string(), "reference".to_string()],
            vec!["md25soils".to_string(), "simple".to_string()],
        ];
        let rendered = render_table(&["file", "kind"], &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "file       kind");
        assert_eq!(lines[1], "---------  ---------");
        assert_eq!(lines[2], "md19crops  reference");
        assert!(lines.iter().all(|l| !l.ends_with(' ')));
    }
}
