/// Exploratory breakdowns of review outcomes
///
/// Counts upheld and overturned determinations per report year and per value
/// of a categorical field.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::core::dataset::{Determination, ReviewField, ReviewTable};

lazy_static! {
    /// Leading number of an age band such as "11 to 20" or "65+"
    static ref AGE_BAND_START: Regex = Regex::new(r"^\s*(\d+)").unwrap();
}

/// Determination counts for one report year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: u16,
    pub total_reviewed: usize,
    pub num_overturned: usize,
    pub num_upheld: usize,
    pub percent_overturned: f64,
}

/// Determination counts for one value of a categorical field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub overturned: usize,
    pub upheld: usize,
    pub total: usize,
    pub percent_overturned: f64,
}

/// All category counts for one field
#[derive(Debug, Clone, Serialize)]
pub struct Breakdown {
    pub field: ReviewField,
    pub categories: Vec<CategoryCount>,
}

#[derive(Default)]
struct Tally {
    overturned: usize,
    upheld: usize,
}

impl Tally {
    fn add(&mut self, determination: Determination) {
        match determination {
            Determination::Overturned => self.overturned += 1,
            Determination::Upheld => self.upheld += 1,
        }
    }

    fn total(&self) -> usize {
        self.overturned + self.upheld
    }

    fn rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.overturned as f64 / self.total() as f64
        }
    }
}

/// Reviews, overturns and overturn rate per report year, oldest first
pub fn annual_trend(table: &ReviewTable) -> Vec<YearSummary> {
    let mut years: BTreeMap<u16, Tally> = BTreeMap::new();
    for record in table.records() {
        years.entry(record.report_year).or_default().add(record.determination);
    }

    years
        .into_iter()
        .map(|(year, tally)| YearSummary {
            year,
            total_reviewed: tally.total(),
            num_overturned: tally.overturned,
            num_upheld: tally.upheld,
            percent_overturned: tally.rate(),
        })
        .collect()
}

/// Determination counts per value of `field`
///
/// Age bands are ordered by their starting age, everything else by name.
pub fn breakdown_by(table: &ReviewTable, field: ReviewField) -> Breakdown {
    let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
    for record in table.records() {
        tallies
            .entry(field.value_of(record).into_owned())
            .or_default()
            .add(record.determination);
    }

    let mut categories: Vec<CategoryCount> = tallies
        .into_iter()
        .map(|(category, tally)| CategoryCount {
            overturned: tally.overturned,
            upheld: tally.upheld,
            total: tally.total(),
            percent_overturned: tally.rate(),
            category,
        })
        .collect();

    if field == ReviewField::AgeRange {
        categories.sort_by(|a, b| compare_age_bands(&a.category, &b.category));
    }

    Breakdown { field, categories }
}

/// Share of overturned reviews in each age band
pub fn overturn_rate_by_age(table: &ReviewTable) -> Breakdown {
    breakdown_by(table, ReviewField::AgeRange)
}

/// Starting age of a band label, if it has one
pub fn age_band_start(label: &str) -> Option<u32> {
    AGE_BAND_START
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn compare_age_bands(a: &str, b: &str) -> Ordering {
    match (age_band_start(a), age_band_start(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        // Unlabelled bands sort last
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ReviewTable {
        let csv = "ReportYear,Determination,AgeRange,PatientGender,DiagnosisCategory,TreatmentCategory,Type,DaysToReview,Findings\n\
            2014,Overturned Decision of Health Plan,65+,Female,Cancer,Surgery,Medical Necessity,10,a\n\
            2014,Upheld Decision of Health Plan,11 to 20,Male,Mental,Residential,Medical Necessity,11,b\n\
            2015,Overturned Decision of Health Plan,11 to 20,Female,Mental,Residential,Experimental,12,c\n\
            2015,Overturned Decision of Health Plan,0 to 10,Male,Cancer,Pharmacy,Urgent Care,13,d\n\
            2015,Upheld Decision of Health Plan,Unknown,Male,Cancer,Pharmacy,Urgent Care,14,e\n";
        ReviewTable::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_annual_trend() {
        let trend = annual_trend(&sample_table());
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].year, 2014);
        assert_eq!(trend[0].total_reviewed, 2);
        assert_eq!(trend[0].num_overturned, 1);
        assert_eq!(trend[1].num_upheld, 1);
        assert!((trend[1].percent_overturned - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_age_bands_sorted_numerically() {
        let breakdown = overturn_rate_by_age(&sample_table());
        let order: Vec<&str> = breakdown
            .categories
            .iter()
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(order, vec!["0 to 10", "11 to 20", "65+", "Unknown"]);

        let teens = &breakdown.categories[1];
        assert_eq!((teens.overturned, teens.upheld, teens.total), (1, 1, 2));
        assert!((teens.percent_overturned - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_breakdown_counts_sum_to_rows() {
        let table = sample_table();
        for field in [
            ReviewField::PatientGender,
            ReviewField::DiagnosisCategory,
            ReviewField::TreatmentCategory,
            ReviewField::ReviewType,
        ] {
            let breakdown = breakdown_by(&table, field);
            let total: usize = breakdown.categories.iter().map(|c| c.total).sum();
            assert_eq!(total, table.len());
        }
    }

    #[test]
    fn test_age_band_start() {
        assert_eq!(age_band_start("11 to 20"), Some(11));
        assert_eq!(age_band_start("65+"), Some(65));
        assert_eq!(age_band_start("Unknown"), None);
    }
}
