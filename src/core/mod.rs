/// Core module for review analysis
///
/// This module contains the dataset loader, the statistical routines and the
/// analyzer that ties them together into a single report.

pub mod analyzer;
pub mod dataset;
pub mod eda;
pub mod error;
pub mod hypothesis;
pub mod power;
