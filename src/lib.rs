/// IMR Analyzer - exploratory analysis and hypothesis testing for Independent Medical Reviews
///
/// This library loads IMR outcome extracts, breaks determinations down by
/// demographic and clinical attributes, compares the overturn rate of one
/// group against the rest, and quantifies significance and statistical power.

// Re-export core modules
pub mod core;
pub mod utils;

// Re-export main analyzer types for convenience
pub use crate::core::analyzer::{AnalysisReport, ImrAnalyzer};
pub use crate::core::dataset::{ReviewField, ReviewTable};
pub use crate::core::error::{ImrError, ImrResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Analyze a single review file and return the report
///
/// This is a convenience function for simple use cases.
///
/// # Arguments
///
/// * `file_path` - Path to the IMR CSV file
/// * `config` - Comparison group and significance level
///
/// # Returns
///
/// The full analysis report
pub fn analyze_file<P: AsRef<std::path::Path>>(
    file_path: P,
    config: &config::AnalysisConfig,
) -> anyhow::Result<AnalysisReport> {
    let table = ReviewTable::load(file_path.as_ref())?;
    let analyzer = ImrAnalyzer::new(config)?;
    Ok(analyzer.analyze(&table)?)
}

/// Library configuration and utilities
pub mod config {
    use std::path::{Path, PathBuf};

    use anyhow::{Context, Result};
    use serde::{Deserialize, Serialize};

    use crate::core::dataset::ReviewField;

    /// Analysis options, loadable from a JSON file
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct AnalysisConfig {
        /// Column that defines the comparison group
        pub group_field: ReviewField,
        /// Value of `group_field` for the comparison group
        pub group_value: String,
        /// One of 0.05, 0.02 or 0.01
        pub significance_level: f64,
        /// Directory for rendered charts
        pub charts_dir: PathBuf,
        pub render_charts: bool,
    }

    impl Default for AnalysisConfig {
        fn default() -> Self {
            Self {
                group_field: ReviewField::AgeRange,
                group_value: "11 to 20".to_string(),
                significance_level: 0.05,
                charts_dir: PathBuf::from("charts"),
                render_charts: true,
            }
        }
    }

    impl AnalysisConfig {
        /// Read a configuration file; absent keys keep their defaults
        pub fn from_file(path: &Path) -> Result<Self> {
            let config_str = std::fs::read_to_string(path)
                .context(format!("Failed to read configuration file: {}", path.display()))?;
            serde_json::from_str(&config_str)
                .context(format!("Invalid JSON in configuration file: {}", path.display()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_partial_config_keeps_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.json");
            std::fs::write(&path, r#"{"group_field": "PatientGender", "group_value": "Female"}"#)
                .unwrap();

            let config = AnalysisConfig::from_file(&path).unwrap();
            assert_eq!(config.group_field, ReviewField::PatientGender);
            assert_eq!(config.group_value, "Female");
            assert_eq!(config.significance_level, 0.05);
            assert!(config.render_charts);
        }

        #[test]
        fn test_invalid_config_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.json");
            std::fs::write(&path, "{ not json").unwrap();
            assert!(AnalysisConfig::from_file(&path).is_err());
        }
    }
}
