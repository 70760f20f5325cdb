/// Utility modules for the review analyzer
///
/// This module contains helpers for file access, chart rendering and
/// report formatting.

pub mod charts;
pub mod file_utils;
pub mod output_formatter;
