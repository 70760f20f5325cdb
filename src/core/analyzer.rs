/// Core review analyzer implementation
///
/// This file contains the ImrAnalyzer, which runs the exploratory breakdowns,
/// the two-sample tests and the power analysis over a loaded review table and
/// collects everything into a single serializable report.

use log::{info, warn};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::core::dataset::{ReviewField, ReviewTable};
use crate::core::eda::{self, Breakdown, YearSummary};
use crate::core::error::ImrResult;
use crate::core::hypothesis::{self, welch_t_test, ProportionTest, WelchTest};
use crate::core::power::{PowerAnalysis, SignificanceLevel, SignificanceMap};
use crate::utils::file_utils;

/// Fields broken down in every report, in display order
pub const BREAKDOWN_FIELDS: [ReviewField; 5] = [
    ReviewField::AgeRange,
    ReviewField::PatientGender,
    ReviewField::DiagnosisCategory,
    ReviewField::TreatmentCategory,
    ReviewField::ReviewType,
];

/// Headline statistics of the loaded dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub source: Option<String>,
    /// SHA-256 of the source file
    pub fingerprint: Option<String>,
    pub rows: usize,
    pub overturned: usize,
    pub upheld: usize,
    pub overturn_rate: f64,
    pub days_to_review_median: f64,
    pub days_to_review_mean: f64,
    pub imputed_days: usize,
    pub mean_findings_len: f64,
    pub first_year: Option<u16>,
    pub last_year: Option<u16>,
}

/// Comparison of one group against every other review
#[derive(Debug, Clone, Serialize)]
pub struct GroupComparison {
    pub field: ReviewField,
    pub value: String,
    pub proportion: ProportionTest,
    pub welch: WelchTest,
    /// Critical values under the null distribution
    pub significance: SignificanceMap,
    pub level: SignificanceLevel,
    /// Power analysis at the configured level
    pub selected: PowerAnalysis,
    /// Power analysis at every supported level
    pub power: Vec<PowerAnalysis>,
    /// Whether the observed difference falls outside the interval at `level`
    pub reject_null: bool,
}

/// Everything computed for one dataset
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: String,
    pub summary: DatasetSummary,
    pub annual_trend: Vec<YearSummary>,
    pub breakdowns: Vec<Breakdown>,
    pub comparison: GroupComparison,
}

impl AnalysisReport {
    pub fn breakdown(&self, field: ReviewField) -> Option<&Breakdown> {
        self.breakdowns.iter().find(|b| b.field == field)
    }
}

/// Review analyzer configured for one group comparison
#[derive(Debug)]
pub struct ImrAnalyzer {
    config: AnalysisConfig,
    level: SignificanceLevel,
}

impl ImrAnalyzer {
    /// Create a new analyzer, rejecting unsupported significance levels
    pub fn new(config: &AnalysisConfig) -> ImrResult<Self> {
        let level = SignificanceLevel::try_from(config.significance_level)?;
        Ok(Self {
            config: config.clone(),
            level,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full analysis over a loaded table
    pub fn analyze(&self, table: &ReviewTable) -> ImrResult<AnalysisReport> {
        info!(
            "Analyzing {} reviews: {} == '{}' vs others at {} significance",
            table.len(),
            self.config.group_field,
            self.config.group_value,
            self.level
        );

        let summary = Self::summarize(table);
        let annual_trend = eda::annual_trend(table);
        let breakdowns = BREAKDOWN_FIELDS
            .iter()
            .map(|&field| eda::breakdown_by(table, field))
            .collect();
        let comparison = self.compare(table)?;

        info!(
            "Difference in overturn rate {:.4}, Welch t={:.4}, power={:.3}",
            comparison.proportion.difference, comparison.welch.t_stat, comparison.selected.power
        );

        Ok(AnalysisReport {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            summary,
            annual_trend,
            breakdowns,
            comparison,
        })
    }

    /// Run the two-sample tests for the configured group
    pub fn compare(&self, table: &ReviewTable) -> ImrResult<GroupComparison> {
        let (group, others) = table.split_by(self.config.group_field, &self.config.group_value);

        let proportion = ProportionTest::new(&group, &others)?;
        let welch = welch_t_test(&group, &others)?;

        let significance = SignificanceMap::for_distribution(&proportion.null);
        let selected = PowerAnalysis::compute(self.level, &significance, &proportion.alternative);
        let power = PowerAnalysis::all(&significance, &proportion.alternative);

        let threshold = significance.threshold(self.level);
        let reject_null =
            proportion.difference > threshold.upper || proportion.difference < threshold.lower;

        Ok(GroupComparison {
            field: self.config.group_field,
            value: self.config.group_value.clone(),
            proportion,
            welch,
            significance,
            level: self.level,
            selected,
            power,
            reject_null,
        })
    }

    fn summarize(table: &ReviewTable) -> DatasetSummary {
        let records = table.records();
        let overturned = records.iter().filter(|r| r.determination_code == 1).count();
        let days: Vec<f64> = records.iter().map(|r| r.days_to_review).collect();
        let findings: Vec<f64> = records.iter().map(|r| r.findings_len as f64).collect();

        let fingerprint = table.source().and_then(|path| match file_utils::sha256_file(path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!("Could not fingerprint {}: {}", path.display(), e);
                None
            }
        });

        DatasetSummary {
            source: table.source().map(|p| p.display().to_string()),
            fingerprint,
            rows: records.len(),
            overturned,
            upheld: records.len() - overturned,
            overturn_rate: hypothesis::mean(&table.determination_codes()).unwrap_or(0.0),
            days_to_review_median: table.days_median(),
            days_to_review_mean: hypothesis::mean(&days).unwrap_or(0.0),
            imputed_days: table.imputed_days(),
            mean_findings_len: hypothesis::mean(&findings).unwrap_or(0.0),
            first_year: records.iter().map(|r| r.report_year).min(),
            last_year: records.iter().map(|r| r.report_year).max(),
        }
    }
}
