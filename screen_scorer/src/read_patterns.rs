use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};

use crate::data_handling::frequency_table::{
    FrequencyTable, ALIGNED_COL, PERCENT_COL, READS_COL, REFERENCE_COL,
};
use crate::data_handling::reference_catalog::ReferenceCatalogFile;
use crate::errors::{ScreenError, ScreenResult};
use crate::helper_functions::sample_name;
use crate::models::{Dataset, FrequencyRow, ReferenceCatalog, INTENDED_ONLY_LABEL, SYNONY_ONLY_LABEL};

const GAP: u8 = b'-';

pub const ROW_ID_COL: &str = "Row_id";
pub const MUT_TYPE_COL: &str = "Mut_type";
pub const MUT_CLASS_COL: &str = "Mut_class";

pub const SINGLE_EDIT_CLASS: &str = "Single_edit";
pub const INSERTION_CLASS: &str = "Insertion";
pub const DELETION_CLASS: &str = "Deletion";
pub const COMPLEX_CLASS: &str = "Complex";

/// Structural class of an aligned read, decided by where gaps occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GapPattern {
    Substitution,
    Insertion,
    Deletion,
    Complex,
}

pub fn gap_pattern(aligned: &str, reference: &str) -> GapPattern {
    let aligned_gap = aligned.as_bytes().contains(&GAP);
    let reference_gap = reference.as_bytes().contains(&GAP);
    match (aligned_gap, reference_gap) {
        (false, false) => GapPattern::Substitution,
        (false, true) => GapPattern::Insertion,
        (true, false) => GapPattern::Deletion,
        (true, true) => GapPattern::Complex,
    }
}

/// Row ids per gap pattern. The four lists are disjoint and together cover
/// every input row.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Partition {
    pub substitution: Vec<usize>,
    pub insertion: Vec<usize>,
    pub deletion: Vec<usize>,
    pub complex: Vec<usize>,
}

pub fn partition_rows(rows: &[FrequencyRow]) -> Partition {
    let mut partition = Partition::default();
    for row in rows {
        let bucket = match gap_pattern(&row.aligned, &row.reference) {
            GapPattern::Substitution => &mut partition.substitution,
            GapPattern::Insertion => &mut partition.insertion,
            GapPattern::Deletion => &mut partition.deletion,
            GapPattern::Complex => &mut partition.complex,
        };
        bucket.push(row.row_id);
    }
    partition
}

/// One distinct aligned read with its mutation annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPattern {
    pub row_id: usize,
    pub aligned: String,
    pub reference: String,
    pub reads: u64,
    pub percent: f64,
    pub mut_type: String,
    pub mut_class: String,
}

fn check_same_length(aligned: &str, reference: &str) -> ScreenResult<()> {
    if aligned.len() != reference.len() {
        return Err(ScreenError::MalformedInput(format!(
            "aligned ({} nt) and reference ({} nt) lengths differ for `{}`",
            aligned.len(),
            reference.len(),
            aligned
        )));
    }
    Ok(())
}

/// Whitelisted substitutions take their catalog label; anything else is
/// named after its mismatch count.
pub fn classify_substitution(
    aligned: &str,
    reference: &str,
    whitelist: &ReferenceCatalog,
) -> ScreenResult<(String, String)> {
    if let Some(entry) = whitelist.get(aligned) {
        let class = match entry.label.as_str() {
            INTENDED_ONLY_LABEL | SYNONY_ONLY_LABEL => SINGLE_EDIT_CLASS.to_string(),
            other => other.to_string(),
        };
        return Ok((entry.label.clone(), class));
    }

    check_same_length(aligned, reference)?;
    let mismatches = aligned
        .bytes()
        .zip(reference.bytes())
        .filter(|(a, r)| !a.eq_ignore_ascii_case(r))
        .count();
    let mut_type = format!("sub{}", mismatches);
    let mut_class = if mismatches <= 4 {
        mut_type.clone()
    } else {
        "sub5more".to_string()
    };
    Ok((mut_type, mut_class))
}

/// Bases of the first contiguous gap run in `gapped`, read from `source`.
/// Later runs are ignored.
pub fn first_gap_run(gapped: &str, source: &str) -> ScreenResult<Option<String>> {
    check_same_length(gapped, source)?;
    let bytes = gapped.as_bytes();
    let Some(start) = bytes.iter().position(|&b| b == GAP) else {
        return Ok(None);
    };
    let end = bytes[start..]
        .iter()
        .position(|&b| b != GAP)
        .map_or(bytes.len(), |offset| start + offset);

    source
        .get(start..end)
        .map(|s| Some(s.to_string()))
        .ok_or_else(|| ScreenError::MalformedInput(format!("non-ASCII sequence `{}`", source)))
}

/// `ins{len}:{bases}` / `del{len}:{bases}` from the first gap run.
fn classify_indel(prefix: &str, class: &str, gapped: &str, source: &str) -> ScreenResult<(String, String)> {
    let bases = first_gap_run(gapped, source)?.unwrap_or_default();
    Ok((format!("{}{}:{}", prefix, bases.len(), bases), class.to_string()))
}

/// Merges rows sharing an (aligned, reference) pair, keeping the first row's
/// id and position and summing reads.
fn collapse_duplicates(rows: &[FrequencyRow]) -> Vec<FrequencyRow> {
    let mut seen: HashMap<(&str, &str), usize> = HashMap::with_capacity(rows.len());
    let mut collapsed: Vec<FrequencyRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match seen.get(&(row.aligned.as_str(), row.reference.as_str())) {
            Some(&i) => {
                let kept = &mut collapsed[i];
                kept.reads += row.reads;
                kept.percent = match (kept.percent, row.percent) {
                    (Some(a), Some(b)) => Some(a + b),
                    _ => None,
                };
            }
            None => {
                seen.insert((row.aligned.as_str(), row.reference.as_str()), collapsed.len());
                collapsed.push(row.clone());
            }
        }
    }
    collapsed
}

/// Annotates every distinct read with a mutation type and class. Each gap
/// class is annotated separately and re-joined on `row_id`, so the output
/// keeps the input order.
pub fn classify_reads(rows: &[FrequencyRow], whitelist: &ReferenceCatalog) -> ScreenResult<Vec<ReadPattern>> {
    let rows = collapse_duplicates(rows);
    let by_id: HashMap<usize, &FrequencyRow> = rows.iter().map(|r| (r.row_id, r)).collect();
    let partition = partition_rows(&rows);
    debug!(
        "Partition: {} substitution, {} insertion, {} deletion, {} complex",
        partition.substitution.len(),
        partition.insertion.len(),
        partition.deletion.len(),
        partition.complex.len()
    );

    let mut annotations: HashMap<usize, (String, String)> = HashMap::with_capacity(rows.len());
    for &id in &partition.substitution {
        let row = by_id[&id];
        annotations.insert(id, classify_substitution(&row.aligned, &row.reference, whitelist)?);
    }
    for &id in &partition.insertion {
        let row = by_id[&id];
        annotations.insert(id, classify_indel("ins", INSERTION_CLASS, &row.reference, &row.aligned)?);
    }
    for &id in &partition.deletion {
        let row = by_id[&id];
        annotations.insert(id, classify_indel("del", DELETION_CLASS, &row.aligned, &row.reference)?);
    }
    for &id in &partition.complex {
        annotations.insert(id, (COMPLEX_CLASS.to_string(), COMPLEX_CLASS.to_string()));
    }

    let total: u64 = rows.iter().map(|r| r.reads).sum();
    rows.iter()
        .map(|row| {
            let (mut_type, mut_class) = annotations.remove(&row.row_id).ok_or_else(|| {
                ScreenError::UnmatchedKey(format!("row {} was not classified", row.row_id))
            })?;
            let percent = row.percent.unwrap_or(if total == 0 {
                0.0
            } else {
                row.reads as f64 * 100.0 / total as f64
            });
            Ok(ReadPattern {
                row_id: row.row_id,
                aligned: row.aligned.clone(),
                reference: row.reference.clone(),
                reads: row.reads,
                percent,
                mut_type,
                mut_class,
            })
        })
        .collect()
}

/// Reads per mutation class, in first-seen order.
pub fn class_summary(patterns: &[ReadPattern]) -> Vec<(String, u64)> {
    let mut order: Vec<(String, u64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for p in patterns {
        match index.get(p.mut_class.as_str()) {
            Some(&i) => order[i].1 += p.reads,
            None => {
                index.insert(p.mut_class.as_str(), order.len());
                order.push((p.mut_class.clone(), p.reads));
            }
        }
    }
    order
}

pub fn read_pattern_frame(patterns: &[ReadPattern]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(ROW_ID_COL.into(), patterns.iter().map(|p| p.row_id as u64).collect::<Vec<u64>>()),
        Column::new(ALIGNED_COL.into(), patterns.iter().map(|p| p.aligned.clone()).collect::<Vec<_>>()),
        Column::new(REFERENCE_COL.into(), patterns.iter().map(|p| p.reference.clone()).collect::<Vec<_>>()),
        Column::new(READS_COL.into(), patterns.iter().map(|p| p.reads).collect::<Vec<u64>>()),
        Column::new(PERCENT_COL.into(), patterns.iter().map(|p| p.percent).collect::<Vec<f64>>()),
        Column::new(MUT_TYPE_COL.into(), patterns.iter().map(|p| p.mut_type.clone()).collect::<Vec<_>>()),
        Column::new(MUT_CLASS_COL.into(), patterns.iter().map(|p| p.mut_class.clone()).collect::<Vec<_>>()),
    ])
}

/// File-level entry point of the `classify-reads` stage.
pub fn run_read_classification(freq_table: &Path, whitelist: &Path) -> ScreenResult<Vec<ReadPattern>> {
    let name = sample_name(freq_table);
    let whitelist = ReferenceCatalogFile { path: whitelist.to_path_buf() }.read()?;
    let rows = FrequencyTable { path: freq_table.to_path_buf() }.read_alignments()?;
    info!("[{}] Classifying {} aligned reads", name, rows.len());

    let patterns = classify_reads(&rows, &whitelist)?;
    for (class, reads) in class_summary(&patterns) {
        info!("[{}] {:<12} {:>10} reads", name, class, reads);
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogEntry, WT_LABEL};
    use std::collections::HashSet;

    const REF: &str = "ACGTACGTAC";

    fn row(row_id: usize, aligned: &str, reference: &str, reads: u64) -> FrequencyRow {
        FrequencyRow {
            row_id,
            aligned: aligned.to_string(),
            reference: reference.to_string(),
            reads,
            percent: None,
        }
    }

    fn whitelist() -> ReferenceCatalog {
        ReferenceCatalog::new(vec![
            CatalogEntry::new(REF, WT_LABEL),
            CatalogEntry::new("ACGAACGTAC", INTENDED_ONLY_LABEL),
            CatalogEntry::new("ACGTACGTAA", SYNONY_ONLY_LABEL),
            CatalogEntry::new("ACGAACGTAA", "Intended_and_Synony"),
        ])
        .unwrap()
    }

    fn sample_rows() -> Vec<FrequencyRow> {
        vec![
            row(0, REF, REF, 50),
            row(1, "ACG-ACGTAC", REF, 10),
            row(2, "ACGTTACGTAC", "ACGT-ACGTAC", 5),
            row(3, "ACGAACGTAC", REF, 20),
            row(4, "TTTTACGTAC", REF, 3),
            row(5, "AC-TTACGTAC", "ACGT-ACGTAC", 2),
            row(6, "TGCAATGCAT", REF, 1),
            row(7, "ACGAACGTAA", REF, 9),
        ]
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let rows = sample_rows();
        let p = partition_rows(&rows);
        let all: Vec<usize> = p
            .substitution
            .iter()
            .chain(&p.insertion)
            .chain(&p.deletion)
            .chain(&p.complex)
            .copied()
            .collect();
        let unique: HashSet<usize> = all.iter().copied().collect();
        assert_eq!(all.len(), rows.len());
        assert_eq!(unique, rows.iter().map(|r| r.row_id).collect());
        assert_eq!(p.insertion, vec![2]);
        assert_eq!(p.deletion, vec![1]);
        assert_eq!(p.complex, vec![5]);
    }

    #[test]
    fn substitutions_use_whitelist_then_mismatch_count() {
        let wl = whitelist();
        assert_eq!(
            classify_substitution(REF, REF, &wl).unwrap(),
            (WT_LABEL.to_string(), WT_LABEL.to_string())
        );
        assert_eq!(
            classify_substitution("ACGAACGTAC", REF, &wl).unwrap(),
            (INTENDED_ONLY_LABEL.to_string(), SINGLE_EDIT_CLASS.to_string())
        );
        assert_eq!(
            classify_substitution("ACGTACGTAA", REF, &wl).unwrap().1,
            SINGLE_EDIT_CLASS
        );
        assert_eq!(
            classify_substitution("ACGAACGTAA", REF, &wl).unwrap().1,
            "Intended_and_Synony"
        );
        assert_eq!(
            classify_substitution("TTTTACGTAC", REF, &wl).unwrap(),
            ("sub3".to_string(), "sub3".to_string())
        );
        assert_eq!(
            classify_substitution("TGCAATGCAT", REF, &wl).unwrap(),
            ("sub7".to_string(), "sub5more".to_string())
        );
    }

    #[test]
    fn unequal_substitution_lengths_are_malformed() {
        assert!(matches!(
            classify_substitution("ACG", REF, &whitelist()),
            Err(ScreenError::MalformedInput(_))
        ));
    }

    #[test]
    fn only_first_gap_run_is_reported() {
        // two deletion runs: "GT" then "C"
        let aligned = "AC--ACG-AC";
        assert_eq!(first_gap_run(aligned, REF).unwrap(), Some("GT".to_string()));
        assert_eq!(first_gap_run("ACGTACGTA-", REF).unwrap(), Some("C".to_string()));
        assert_eq!(first_gap_run(REF, REF).unwrap(), None);
    }

    #[test]
    fn classification_keeps_input_order() {
        let patterns = classify_reads(&sample_rows(), &whitelist()).unwrap();
        let ids: Vec<usize> = patterns.iter().map(|p| p.row_id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());

        let types: Vec<&str> = patterns.iter().map(|p| p.mut_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                WT_LABEL,
                "del1:T",
                "ins1:T",
                INTENDED_ONLY_LABEL,
                "sub3",
                COMPLEX_CLASS,
                "sub7",
                "Intended_and_Synony"
            ]
        );
        assert_eq!(patterns[1].mut_class, DELETION_CLASS);
        assert_eq!(patterns[2].mut_class, INSERTION_CLASS);
        assert!((patterns[0].percent - 50.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_reads_are_collapsed_in_place() {
        let rows = vec![row(0, REF, REF, 4), row(1, "TTTTACGTAC", REF, 1), row(2, REF, REF, 6)];
        let patterns = classify_reads(&rows, &whitelist()).unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].reads, 10);
        assert_eq!(patterns[1].row_id, 1);
        assert_eq!(
            class_summary(&patterns),
            vec![(WT_LABEL.to_string(), 10), ("sub3".to_string(), 1)]
        );
    }
}
