/// Review dataset loading and preparation
///
/// This file loads the IMR CSV extract, validates its columns, imputes missing
/// review durations and derives the per-record features used by the analysis.

use std::borrow::Cow;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::{ImrError, ImrResult};
use crate::utils::file_utils;

/// Columns every input file must provide
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "ReportYear",
    "Determination",
    "AgeRange",
    "PatientGender",
    "DiagnosisCategory",
    "TreatmentCategory",
    "Type",
    "DaysToReview",
    "Findings",
];

lazy_static! {
    static ref OVERTURNED: Regex = Regex::new(r"(?i)\boverturned\b").unwrap();
    static ref UPHELD: Regex = Regex::new(r"(?i)\bupheld\b").unwrap();
}

/// Outcome of an independent medical review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Determination {
    /// The health plan's denial was upheld
    Upheld,
    /// The health plan's denial was overturned
    Overturned,
}

impl Determination {
    /// Parse the raw determination text, e.g. "Overturned Decision of Health Plan"
    pub fn parse(raw: &str) -> Option<Self> {
        if OVERTURNED.is_match(raw) {
            Some(Determination::Overturned)
        } else if UPHELD.is_match(raw) {
            Some(Determination::Upheld)
        } else {
            None
        }
    }

    /// Binary encoding: 1 for overturned, 0 for upheld
    pub fn code(self) -> u8 {
        match self {
            Determination::Upheld => 0,
            Determination::Overturned => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Determination::Upheld => "Upheld",
            Determination::Overturned => "Overturned",
        }
    }
}

/// Categorical columns a comparison or breakdown can be keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewField {
    ReportYear,
    AgeRange,
    PatientGender,
    DiagnosisCategory,
    TreatmentCategory,
    #[serde(rename = "Type")]
    ReviewType,
}

impl ReviewField {
    /// Column name as it appears in the CSV header
    pub fn column(self) -> &'static str {
        match self {
            ReviewField::ReportYear => "ReportYear",
            ReviewField::AgeRange => "AgeRange",
            ReviewField::PatientGender => "PatientGender",
            ReviewField::DiagnosisCategory => "DiagnosisCategory",
            ReviewField::TreatmentCategory => "TreatmentCategory",
            ReviewField::ReviewType => "Type",
        }
    }

    /// Value of this field for a record
    pub fn value_of<'a>(self, record: &'a ReviewRecord) -> Cow<'a, str> {
        match self {
            ReviewField::ReportYear => Cow::Owned(record.report_year.to_string()),
            ReviewField::AgeRange => Cow::Borrowed(&record.age_range),
            ReviewField::PatientGender => Cow::Borrowed(&record.patient_gender),
            ReviewField::DiagnosisCategory => Cow::Borrowed(&record.diagnosis_category),
            ReviewField::TreatmentCategory => Cow::Borrowed(&record.treatment_category),
            ReviewField::ReviewType => Cow::Borrowed(&record.review_type),
        }
    }
}

impl fmt::Display for ReviewField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for ReviewField {
    type Err = ImrError;

    /// Accepts the CSV column name or a kebab-case alias (`age-range`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "reportyear" | "year" => Ok(ReviewField::ReportYear),
            "agerange" | "age" => Ok(ReviewField::AgeRange),
            "patientgender" | "gender" => Ok(ReviewField::PatientGender),
            "diagnosiscategory" | "diagnosis" => Ok(ReviewField::DiagnosisCategory),
            "treatmentcategory" | "treatment" => Ok(ReviewField::TreatmentCategory),
            "type" | "reviewtype" => Ok(ReviewField::ReviewType),
            _ => Err(ImrError::UnknownField(s.to_string())),
        }
    }
}

/// Row layout of the source CSV
#[derive(Debug, Deserialize)]
struct RawReview {
    #[serde(rename = "ReportYear")]
    report_year: u16,
    #[serde(rename = "Determination")]
    determination: String,
    #[serde(rename = "AgeRange")]
    age_range: String,
    #[serde(rename = "PatientGender")]
    patient_gender: String,
    #[serde(rename = "DiagnosisCategory")]
    diagnosis_category: String,
    #[serde(rename = "TreatmentCategory")]
    treatment_category: String,
    #[serde(rename = "Type")]
    review_type: String,
    #[serde(rename = "DaysToReview", deserialize_with = "csv::invalid_option")]
    days_to_review: Option<f64>,
    #[serde(rename = "Findings", default)]
    findings: String,
}

/// A single independent medical review with its derived features
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub report_year: u16,
    pub determination: Determination,
    pub age_range: String,
    pub patient_gender: String,
    pub diagnosis_category: String,
    pub treatment_category: String,
    pub review_type: String,
    /// Days to review, with missing values replaced by the column median
    pub days_to_review: f64,
    /// Whether `days_to_review` was imputed
    pub days_imputed: bool,
    pub findings: String,
    /// 1 if overturned, 0 if upheld
    pub determination_code: u8,
    /// Length of the findings text in characters
    pub findings_len: usize,
}

/// The loaded review table
#[derive(Debug, Clone)]
pub struct ReviewTable {
    records: Vec<ReviewRecord>,
    source: Option<PathBuf>,
    imputed_days: usize,
    days_median: f64,
}

impl ReviewTable {
    /// Load and prepare the reviews stored at `path`
    pub fn load(path: &Path) -> ImrResult<Self> {
        info!("Loading reviews from {}", path.display());

        let data = file_utils::read_dataset(path)?;
        let mut table = Self::from_reader(data.as_ref())?;
        table.source = Some(path.to_path_buf());

        info!("Loaded {} reviews from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parse and prepare reviews from any CSV source
    pub fn from_reader<R: Read>(reader: R) -> ImrResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(ImrError::MissingColumn(column.to_string()));
            }
        }

        let raw = reader
            .deserialize::<RawReview>()
            .collect::<Result<Vec<_>, csv::Error>>()?;
        debug!("Parsed {} raw rows", raw.len());
        if raw.is_empty() {
            return Err(ImrError::EmptyDataset);
        }

        // NaN parses as a float, but counts as missing like an empty cell
        let days: Vec<Option<f64>> = raw
            .iter()
            .map(|r| r.days_to_review.filter(|d| d.is_finite()))
            .collect();
        let (filled, days_median) = fill_missing_with_median(&days)
            .ok_or_else(|| ImrError::EmptyColumn("DaysToReview".to_string()))?;

        let imputed_days = days.iter().filter(|d| d.is_none()).count();
        if imputed_days > 0 {
            warn!(
                "Filled {} missing DaysToReview values with the median ({:.1})",
                imputed_days, days_median
            );
        }

        let records = raw
            .into_iter()
            .zip(filled)
            .zip(days.iter())
            .enumerate()
            .map(|(idx, ((raw, days_to_review), original))| -> ImrResult<ReviewRecord> {
                let determination = Determination::parse(&raw.determination).ok_or_else(|| {
                    ImrError::UnknownDetermination {
                        row: idx + 1,
                        value: raw.determination.clone(),
                    }
                })?;

                Ok(ReviewRecord {
                    report_year: raw.report_year,
                    determination,
                    findings_len: raw.findings.chars().count(),
                    determination_code: determination.code(),
                    age_range: raw.age_range,
                    patient_gender: raw.patient_gender,
                    diagnosis_category: raw.diagnosis_category,
                    treatment_category: raw.treatment_category,
                    review_type: raw.review_type,
                    days_to_review,
                    days_imputed: original.is_none(),
                    findings: raw.findings,
                })
            })
            .collect::<ImrResult<Vec<_>>>()?;

        Ok(Self {
            records,
            source: None,
            imputed_days,
            days_median,
        })
    }

    pub fn records(&self) -> &[ReviewRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// File the table was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of DaysToReview values filled by imputation
    pub fn imputed_days(&self) -> usize {
        self.imputed_days
    }

    /// Median used to fill missing DaysToReview values
    pub fn days_median(&self) -> f64 {
        self.days_median
    }

    /// Determination codes of every record, as floats
    pub fn determination_codes(&self) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| f64::from(r.determination_code))
            .collect()
    }

    /// Partition the determination codes into records where `field == value`
    /// and all other records
    pub fn split_by(&self, field: ReviewField, value: &str) -> (Vec<f64>, Vec<f64>) {
        let mut matching = Vec::new();
        let mut others = Vec::new();

        for record in &self.records {
            let code = f64::from(record.determination_code);
            if field.value_of(record) == value {
                matching.push(code);
            } else {
                others.push(code);
            }
        }

        debug!(
            "Split on {} == '{}': {} matching, {} others",
            field,
            value,
            matching.len(),
            others.len()
        );
        (matching, others)
    }
}

/// Median of a slice, or `None` when empty
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Replace missing values with the median of the present ones.
///
/// Returns the filled column and the median, or `None` if nothing is present.
pub fn fill_missing_with_median(values: &[Option<f64>]) -> Option<(Vec<f64>, f64)> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let fill = median(&present)?;
    let filled = values.iter().map(|v| v.unwrap_or(fill)).collect();
    Some((filled, fill))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ReportYear,Determination,AgeRange,PatientGender,DiagnosisCategory,TreatmentCategory,Type,DaysToReview,Findings\n";

    fn table(rows: &str) -> ImrResult<ReviewTable> {
        ReviewTable::from_reader(format!("{}{}", HEADER, rows).as_bytes())
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_fill_missing_keeps_median() {
        let column = vec![Some(10.0), None, Some(4.0), Some(7.0), None, Some(1.0)];
        let before = median(&[10.0, 4.0, 7.0, 1.0]).unwrap();

        let (filled, fill) = fill_missing_with_median(&column).unwrap();

        assert_eq!(filled.len(), column.len());
        assert!(filled.iter().all(|v| v.is_finite()));
        assert_eq!(fill, before);
        assert_eq!(median(&filled), Some(before));
    }

    #[test]
    fn test_header_only_is_empty_dataset() {
        assert!(matches!(table(""), Err(ImrError::EmptyDataset)));
    }

    #[test]
    fn test_all_days_missing_is_empty_column() {
        let result = table(
            "2015,Upheld Decision of Health Plan,11 to 20,Female,Mental,Residential,Medical Necessity,NA,x\n",
        );
        assert!(matches!(result, Err(ImrError::EmptyColumn(c)) if c == "DaysToReview"));
    }

    #[test]
    fn test_fill_missing_all_null() {
        assert!(fill_missing_with_median(&[None, None]).is_none());
    }

    #[test]
    fn test_determination_parse() {
        assert_eq!(
            Determination::parse("Overturned Decision of Health Plan"),
            Some(Determination::Overturned)
        );
        assert_eq!(
            Determination::parse("Upheld Decision of Health Plan"),
            Some(Determination::Upheld)
        );
        assert_eq!(Determination::parse("Withdrawn"), None);
        assert_eq!(Determination::Overturned.code(), 1);
        assert_eq!(Determination::Upheld.code(), 0);
    }

    #[test]
    fn test_load_derives_features() {
        let table = table(
            "2015,Overturned Decision of Health Plan,11 to 20,Female,Mental,Residential,Medical Necessity,12,Short\n\
             2016,Upheld Decision of Health Plan,21 to 30,Male,Cancer,Surgery,Experimental,,Longer text\n\
             2016,Upheld Decision of Health Plan,65+,Male,Cancer,Surgery,Experimental,30,\n",
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.imputed_days(), 1);
        assert_eq!(table.days_median(), 21.0);

        let records = table.records();
        assert_eq!(records[0].determination_code, 1);
        assert_eq!(records[0].findings_len, 5);
        assert!(!records[0].days_imputed);
        assert_eq!(records[1].days_to_review, 21.0);
        assert!(records[1].days_imputed);
        assert_eq!(records[2].findings_len, 0);
    }

    #[test]
    fn test_missing_column() {
        let err = ReviewTable::from_reader(
            "ReportYear,Determination\n2015,Upheld Decision of Health Plan\n".as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, ImrError::MissingColumn(ref c) if c == "AgeRange"));
    }

    #[test]
    fn test_unknown_determination() {
        let err = table("2015,Pending,11 to 20,Female,Mental,Residential,Medical Necessity,12,x\n")
            .unwrap_err();
        assert!(matches!(err, ImrError::UnknownDetermination { row: 1, .. }));
    }

    #[test]
    fn test_split_by_age() {
        let table = table(
            "2015,Overturned Decision of Health Plan,11 to 20,Female,Mental,Residential,Medical Necessity,12,a\n\
             2015,Upheld Decision of Health Plan,11 to 20,Female,Mental,Residential,Medical Necessity,12,a\n\
             2015,Upheld Decision of Health Plan,41 to 50,Male,Mental,Residential,Medical Necessity,12,a\n",
        )
        .unwrap();

        let (children, others) = table.split_by(ReviewField::AgeRange, "11 to 20");
        assert_eq!(children, vec![1.0, 0.0]);
        assert_eq!(others, vec![0.0]);
    }

    #[test]
    fn test_review_field_from_str() {
        assert_eq!("AgeRange".parse::<ReviewField>().unwrap(), ReviewField::AgeRange);
        assert_eq!("age-range".parse::<ReviewField>().unwrap(), ReviewField::AgeRange);
        assert_eq!("Type".parse::<ReviewField>().unwrap(), ReviewField::ReviewType);
        assert!("Insurer".parse::<ReviewField>().is_err());
    }
}
