/// Simple example demonstrating how to use the IMR Analyzer library

use anyhow::Result;
use imr_analyzer::analyze_file;
use imr_analyzer::config::AnalysisConfig;

fn main() -> Result<()> {
    // Small review extract for analysis
    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("imr_demo.csv");

    let mut csv = String::from(
        "ReportYear,Determination,AgeRange,PatientGender,DiagnosisCategory,TreatmentCategory,Type,DaysToReview,Findings\n",
    );
    let rows = [
        (2014, "Overturned", "11 to 20", 14),
        (2014, "Upheld", "21 to 30", 20),
        (2015, "Overturned", "11 to 20", 12),
        (2015, "Upheld", "41 to 50", 31),
        (2015, "Overturned", "41 to 50", 27),
        (2016, "Upheld", "11 to 20", 18),
        (2016, "Upheld", "51 to 64", 40),
        (2016, "Upheld", "65+", 35),
    ];
    for (year, determination, age, days) in rows {
        csv.push_str(&format!(
            "{},{} Decision of Health Plan,{},Female,Mental,Mental Health,Medical Necessity,{},\"Reviewer findings\"\n",
            year, determination, age, days
        ));
    }
    std::fs::write(&file_path, csv)?;

    println!("Analyzing file: {}", file_path.display());

    // Compare ages 11 to 20 against everyone else at the 0.05 level
    let report = analyze_file(&file_path, &AnalysisConfig::default())?;

    let cmp = &report.comparison;
    println!(
        "\n{} = {}: {:.3} overturned vs {:.3} for all others",
        cmp.field, cmp.value, cmp.proportion.p_a, cmp.proportion.p_b
    );
    println!(
        "Welch's t = {:.4} (df {:.2}, p = {:.4})",
        cmp.welch.t_stat, cmp.welch.df, cmp.welch.p_value
    );
    for analysis in &cmp.power {
        println!(
            "  level {}: alpha {:.3}, beta {:.3}, power {:.3}",
            analysis.level, analysis.alpha, analysis.beta, analysis.power
        );
    }
    println!(
        "\nNull hypothesis {}",
        if cmp.reject_null { "rejected" } else { "not rejected" }
    );

    Ok(())
}
