use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use polars::frame::DataFrame;

use crate::errors::{ScreenError, ScreenResult};

pub const WT_LABEL: &str = "WT_refseq";
pub const SYN_PE_LABEL: &str = "SynPE";
pub const INTENDED_ONLY_LABEL: &str = "Intended_only";
pub const SYNONY_ONLY_LABEL: &str = "Synony_only";
pub const UNMATCHED_KEY: &str = "No_matched";

/// A table on disk that can be loaded and parsed into typed rows.
pub trait Dataset {
    type Output;

    fn load(&self) -> ScreenResult<DataFrame>;

    fn parse(df: DataFrame) -> ScreenResult<Self::Output>;

    fn read(&self) -> ScreenResult<Self::Output> {
        Self::parse(self.load()?)
    }
}

/// Nucleotide- and amino-acid-level identifiers of one catalog variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantIdentity {
    pub aa_var: String,
    pub snv_var: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub ref_seq: String,
    pub label: String,
    pub identity: Option<VariantIdentity>,
}

impl CatalogEntry {
    pub fn new(ref_seq: &str, label: &str) -> Self {
        CatalogEntry {
            ref_seq: ref_seq.to_string(),
            label: label.to_string(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, aa_var: &str, snv_var: &str) -> Self {
        self.identity = Some(VariantIdentity {
            aa_var: aa_var.to_string(),
            snv_var: snv_var.to_string(),
        });
        self
    }
}

/// Ordered set of expected reference sequences. RefSeq values are unique.
#[derive(Debug, Clone)]
pub struct ReferenceCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl ReferenceCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> ScreenResult<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.ref_seq.clone(), i).is_some() {
                return Err(ScreenError::SchemaMismatch(format!(
                    "RefSeq `{}` appears more than once in the catalog",
                    entry.ref_seq
                )));
            }
        }
        Ok(ReferenceCatalog { entries, index })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, ref_seq: &str) -> Option<&CatalogEntry> {
        self.index.get(ref_seq).map(|&i| &self.entries[i])
    }

    pub fn position(&self, ref_seq: &str) -> Option<usize> {
        self.index.get(ref_seq).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One row of the aligner's frequency table. `row_id` is the row's position
/// in the source file and is carried through every downstream join.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyRow {
    pub row_id: usize,
    pub aligned: String,
    pub reference: String,
    pub reads: u64,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantCount {
    pub ref_seq: String,
    pub label: String,
    pub identity: Option<VariantIdentity>,
    pub count: u64,
}

/// Significance of one SynPE variant in a sample against its background.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub ref_seq: String,
    pub label: String,
    pub identity: Option<VariantIdentity>,
    pub count: u64,
    pub rpm: f64,
    pub odds_ratio: f64,
    pub p_value: f64,
    pub edited_wt_count: u64,
    pub background_syn_count: u64,
    pub background_wt_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnvAggregate {
    pub snv_var: String,
    pub aa_var: String,
    pub control: f64,
    pub test: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutType {
    Synonymous,
    Missense,
    Nonsense,
}

impl MutType {
    /// `Stop` suffix is nonsense, identical first and last residue is
    /// synonymous, anything else is missense.
    pub fn from_aa_var(aa_var: &str) -> ScreenResult<MutType> {
        if aa_var.is_empty() {
            return Err(ScreenError::MalformedInput("empty AA_var".to_string()));
        }
        if aa_var.ends_with("Stop") {
            return Ok(MutType::Nonsense);
        }
        if aa_var.chars().next() == aa_var.chars().last() {
            Ok(MutType::Synonymous)
        } else {
            Ok(MutType::Missense)
        }
    }
}

impl fmt::Display for MutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutType::Synonymous => "Synonymous",
            MutType::Missense => "Missense",
            MutType::Nonsense => "Nonsense",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MutType {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Synonymous" => Ok(MutType::Synonymous),
            "Missense" => Ok(MutType::Missense),
            "Nonsense" => Ok(MutType::Nonsense),
            other => Err(ScreenError::InvalidParameter(format!(
                "unknown mutation type `{}` (expected Synonymous, Missense or Nonsense)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVariant {
    pub snv_var: String,
    pub aa_var: String,
    pub control: f64,
    pub test: f64,
    pub raw_lfc: f64,
    pub var_pos: i64,
    pub mut_type: MutType,
    pub lws_reg: f64,
    pub normalized_lfc: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Resistant,
    Sensitive,
    Intermediate,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Resistant => "Resistant",
            Classification::Sensitive => "Sensitive",
            Classification::Intermediate => "Intermediate",
        };
        write!(f, "{}", s)
    }
}

/// Granularity at which replicates are joined and scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreLevel {
    Snv,
    AminoAcid,
}

impl ScoreLevel {
    pub fn key_column(&self) -> &'static str {
        match self {
            ScoreLevel::Snv => "SNV_var",
            ScoreLevel::AminoAcid => "AA_var",
        }
    }
}

impl FromStr for ScoreLevel {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snv" => Ok(ScoreLevel::Snv),
            "aa" | "amino-acid" => Ok(ScoreLevel::AminoAcid),
            _ => Err(ScreenError::InvalidParameter(format!(
                "unknown scoring level `{}` (expected snv or aa)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVariant {
    pub key: String,
    pub aa_var: String,
    pub n_lfc_1: f64,
    pub n_lfc_2: f64,
    pub adjusted_lfc: f64,
    pub mut_type: MutType,
    pub classification: Classification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mut_type_follows_aa_var_shape() {
        assert_eq!(MutType::from_aa_var("E255K").unwrap(), MutType::Missense);
        assert_eq!(MutType::from_aa_var("E255E").unwrap(), MutType::Synonymous);
        assert_eq!(MutType::from_aa_var("E255Stop").unwrap(), MutType::Nonsense);
        assert!(MutType::from_aa_var("").is_err());
    }

    #[test]
    fn catalog_rejects_duplicate_refseq() {
        let entries = vec![
            CatalogEntry::new("ACGT", WT_LABEL),
            CatalogEntry::new("ACGT", SYN_PE_LABEL),
        ];
        assert!(matches!(
            ReferenceCatalog::new(entries),
            Err(ScreenError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn score_level_rejects_unknown_selector() {
        assert_eq!("SNV".parse::<ScoreLevel>().unwrap(), ScoreLevel::Snv);
        assert_eq!("aa".parse::<ScoreLevel>().unwrap(), ScoreLevel::AminoAcid);
        assert!(matches!(
            "codon".parse::<ScoreLevel>(),
            Err(ScreenError::InvalidParameter(_))
        ));
    }
}
