use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use polars::prelude::*;
use tracing::{debug, error, info};

use crate::errors::{missing_column, ScreenError, ScreenResult};
use crate::helper_functions::{f64_column, i64_column, read_csv, require_columns, str_column};

pub const SAAV_COL: &str = "SAAV";
pub const SNV_COL: &str = "SNV";
pub const POS_COL: &str = "pos";
pub const LFC_COL: &str = "LFC";
pub const CLASS_COL: &str = "Class";
pub const VARIANT_COL: &str = "variant";

const LFC_TABLE: &str = "in-vivo LFC table";
const CLASS_TABLE: &str = "class table";

/// FDA-approved tyrosine kinase inhibitors with a class column in the class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tki {
    Imatinib,
    Nilotinib,
    Bosutinib,
    Dasatinib,
    Ponatinib,
    Asciminib,
}

impl Tki {
    pub const ALL: [Tki; 6] = [
        Tki::Imatinib,
        Tki::Nilotinib,
        Tki::Bosutinib,
        Tki::Dasatinib,
        Tki::Ponatinib,
        Tki::Asciminib,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tki::Imatinib => "Imatinib",
            Tki::Nilotinib => "Nilotinib",
            Tki::Bosutinib => "Bosutinib",
            Tki::Dasatinib => "Dasatinib",
            Tki::Ponatinib => "Ponatinib",
            Tki::Asciminib => "Asciminib",
        }
    }
}

impl fmt::Display for Tki {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Tki {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tki::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| {
                ScreenError::InvalidParameter(format!(
                    "`{}` is not an available TKI (expected one of Imatinib, Nilotinib, \
                     Bosutinib, Dasatinib, Ponatinib, Asciminib)",
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvivoRecord {
    pub saav: String,
    pub snv: String,
    pub pos: i64,
    pub lfc: f64,
    pub class: String,
}

/// Sortable class label used by the in-vivo tables.
pub fn ranked_class(class: &str) -> String {
    match class {
        "Resistant" => "1_Resistant".to_string(),
        "Intermediate" => "2_Intermediate".to_string(),
        "Sensitive" => "3_Sensitive".to_string(),
        other => other.to_string(),
    }
}

/// `variant -> class` for one TKI column of the class table.
fn read_class_column(class_file: &Path, tki: Tki) -> ScreenResult<HashMap<String, String>> {
    let mut reader = match csv::Reader::from_path(class_file) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to open class table {}: {}", class_file.display(), e);
            return Err(e.into());
        }
    };
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let variant_idx = position(VARIANT_COL).ok_or_else(|| missing_column(VARIANT_COL, CLASS_TABLE))?;
    let tki_idx = position(tki.name()).ok_or_else(|| missing_column(tki.name(), CLASS_TABLE))?;

    let mut classes = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let variant = record.get(variant_idx).unwrap_or_default();
        let class = record.get(tki_idx).unwrap_or_default();
        classes.insert(variant.to_string(), class.to_string());
    }
    debug!("{} variants classed for {}", classes.len(), tki);
    Ok(classes)
}

/// Class of each requested variant under `tki`, in request order.
pub fn class_list<S: AsRef<str>>(
    variants: &[S],
    class_file: &Path,
    tki: Tki,
) -> ScreenResult<Vec<String>> {
    let classes = read_class_column(class_file, tki)?;
    variants
        .iter()
        .map(|v| {
            classes.get(v.as_ref()).cloned().ok_or_else(|| {
                ScreenError::UnmatchedKey(format!(
                    "variant `{}` has no entry in {}",
                    v.as_ref(),
                    class_file.display()
                ))
            })
        })
        .collect()
}

/// Attaches the ranked drug class to every row of an in-vivo LFC table.
pub fn annotate_invivo(lfc_table: &Path, class_file: &Path, tki: Tki) -> ScreenResult<Vec<InvivoRecord>> {
    info!("Annotating {} with {} classes", lfc_table.display(), tki);
    let df = read_csv(lfc_table)?;
    require_columns(&df, &[SAAV_COL, SNV_COL, POS_COL, LFC_COL], LFC_TABLE)?;

    let saav = str_column(&df, SAAV_COL, LFC_TABLE)?;
    let snv = str_column(&df, SNV_COL, LFC_TABLE)?;
    let pos = i64_column(&df, POS_COL, LFC_TABLE)?;
    let lfc = f64_column(&df, LFC_COL, LFC_TABLE)?;
    let classes = class_list(saav.as_slice(), class_file, tki)?;

    Ok(saav
        .into_iter()
        .zip(snv)
        .zip(pos.into_iter().zip(lfc))
        .zip(classes)
        .map(|(((saav, snv), (pos, lfc)), class)| InvivoRecord {
            saav,
            snv,
            pos,
            lfc,
            class: ranked_class(&class),
        })
        .collect())
}

pub fn invivo_frame(rows: &[InvivoRecord]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(SAAV_COL.into(), rows.iter().map(|r| r.saav.clone()).collect::<Vec<_>>()),
        Column::new(SNV_COL.into(), rows.iter().map(|r| r.snv.clone()).collect::<Vec<_>>()),
        Column::new(POS_COL.into(), rows.iter().map(|r| r.pos).collect::<Vec<i64>>()),
        Column::new(LFC_COL.into(), rows.iter().map(|r| r.lfc).collect::<Vec<f64>>()),
        Column::new(CLASS_COL.into(), rows.iter().map(|r| r.class.clone()).collect::<Vec<_>>()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CLASSES: &str = "variant,Imatinib,Asciminib\n\
                           T315I,Resistant,Sensitive\n\
                           E255K,Intermediate,Sensitive\n\
                           F317L,Sensitive,Resistant\n";

    #[test]
    fn tki_names_form_a_closed_set() {
        assert_eq!("Ponatinib".parse::<Tki>().unwrap(), Tki::Ponatinib);
        assert!(matches!(
            "Gleevec".parse::<Tki>(),
            Err(ScreenError::InvalidParameter(_))
        ));
    }

    #[test]
    fn class_list_follows_request_order() {
        let dir = tempdir().unwrap();
        let class_file = dir.path().join("variants_class.csv");
        fs::write(&class_file, CLASSES).unwrap();

        let got = class_list(&["F317L", "T315I"], &class_file, Tki::Asciminib).unwrap();
        assert_eq!(got, vec!["Resistant".to_string(), "Sensitive".to_string()]);
    }

    #[test]
    fn unknown_variant_is_unmatched_key() {
        let dir = tempdir().unwrap();
        let class_file = dir.path().join("variants_class.csv");
        fs::write(&class_file, CLASSES).unwrap();

        assert!(matches!(
            class_list(&["Y253H"], &class_file, Tki::Imatinib),
            Err(ScreenError::UnmatchedKey(_))
        ));
    }

    #[test]
    fn tki_without_column_is_missing_column() {
        let dir = tempdir().unwrap();
        let class_file = dir.path().join("variants_class.csv");
        fs::write(&class_file, CLASSES).unwrap();

        assert!(matches!(
            class_list(&["T315I"], &class_file, Tki::Dasatinib),
            Err(ScreenError::MissingColumn { .. })
        ));
    }

    #[test]
    fn lfc_table_gets_ranked_classes() {
        let dir = tempdir().unwrap();
        let class_file = dir.path().join("variants_class.csv");
        fs::write(&class_file, CLASSES).unwrap();
        let lfc_file = dir.path().join("mouse_1.csv");
        fs::write(
            &lfc_file,
            "SAAV,SNV,pos,LFC\nE255K,pos763GA,763,0.4\nT315I,pos944CT,944,3.2\n",
        )
        .unwrap();

        let rows = annotate_invivo(&lfc_file, &class_file, Tki::Imatinib).unwrap();
        let classes: Vec<&str> = rows.iter().map(|r| r.class.as_str()).collect();
        assert_eq!(classes, vec!["2_Intermediate", "1_Resistant"]);
        assert_eq!(rows[1].pos, 944);

        let df = invivo_frame(&rows).unwrap();
        assert_eq!(df.shape(), (2, 5));
    }
}
