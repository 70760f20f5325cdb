/// Output formatter for analysis reports
///
/// This module handles formatting and exporting analysis reports in various formats,
/// including console output, JSON, HTML, and CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use handlebars::Handlebars;
use serde_json::{self, json, Value};

use crate::core::analyzer::AnalysisReport;
use crate::core::dataset::ReviewField;
use crate::core::eda::Breakdown;

/// Format an analysis report for console output
///
/// # Arguments
///
/// * `report` - The finished analysis
/// * `use_markdown` - Whether to wrap the output in markdown triple backticks
/// * `summary_only` - Whether to print only the dataset summary and the decision
///
/// # Returns
///
/// Formatted string for console output
pub fn format_report(report: &AnalysisReport, use_markdown: bool, summary_only: bool) -> String {
    let mut output = String::new();

    if use_markdown {
        output.push_str("```\n");
    }

    let summary = &report.summary;
    output.push_str(&format!("{}\n", "Dataset".yellow().bold()));
    if let Some(source) = &summary.source {
        output.push_str(&format!("  {} {}\n", "Source:".cyan().bold(), source));
    }
    if let (Some(first), Some(last)) = (summary.first_year, summary.last_year) {
        output.push_str(&format!("  {} {} ({}-{})\n", "Reviews:".cyan().bold(), summary.rows, first, last));
    }
    output.push_str(&format!(
        "  {} {} of {} ({:.1}%)\n",
        "Overturned:".cyan().bold(),
        summary.overturned,
        summary.rows,
        summary.overturn_rate * 100.0
    ));
    output.push_str(&format!(
        "  {} median {:.1}, mean {:.1} ({} imputed)\n",
        "Days to review:".cyan().bold(),
        summary.days_to_review_median,
        summary.days_to_review_mean,
        summary.imputed_days
    ));
    output.push_str(&format!(
        "  {} {:.1} characters\n\n",
        "Mean finding length:".cyan().bold(),
        summary.mean_findings_len
    ));

    let cmp = &report.comparison;

    if !summary_only {
        if let Some(by_age) = report.breakdown(ReviewField::AgeRange) {
            output.push_str(&format_breakdown(by_age));
        }

        let p = &cmp.proportion;
        output.push_str(&format!("{}\n", "Group Comparison".yellow().bold()));
        output.push_str(&format!(
            "  Probability for {} = {}: {:.4}\n",
            cmp.field, cmp.value, p.p_a
        ));
        output.push_str(&format!("  Probability for all others: {:.4}\n", p.p_b));
        output.push_str(&format!("  Difference in the sample probabilities: {:.4}\n", p.difference));
        output.push_str(&format!(
            "  Pooled proportion: {:.4}, standard error: {:.6}\n",
            p.p_pooled, p.std_err
        ));
        output.push_str(&format!(
            "  z = {:.4}, one-sided p = {:.4}, two-sided p = {:.4}\n\n",
            p.z_stat, p.p_value_one_sided, p.p_value_two_sided
        ));

        let w = &cmp.welch;
        output.push_str(&format!("{}\n", "Welch's t-test".yellow().bold()));
        output.push_str(&format!("  Group sample variance: {:.4}\n", w.var_a));
        output.push_str(&format!("  Group sample size: {}\n", w.n_a));
        output.push_str(&format!("  Others sample variance: {:.4}\n", w.var_b));
        output.push_str(&format!("  Others sample size: {}\n", w.n_b));
        output.push_str(&format!("  Welch's t-statistic: {:.4}\n", w.t_stat));
        output.push_str(&format!("  Degrees of freedom: {:.2}\n", w.df));
        output.push_str(&format!("  p-value: {:.4}\n\n", w.p_value));

        output.push_str(&format!("{}\n", "Significance and Power".yellow().bold()));
        output.push_str(&format!(
            "  {:<7} {:>10} {:>8} {:>8} {:>8}\n",
            "level", "critical", "alpha", "beta", "power"
        ));
        for analysis in &cmp.power {
            let marker = if analysis.level == cmp.level { "*" } else { " " };
            output.push_str(&format!(
                "{} {:<7} {:>10.4} {:>8.3} {:>8.3} {:>8.3}\n",
                marker,
                analysis.level.to_string(),
                analysis.critical_value,
                analysis.alpha,
                analysis.beta,
                analysis.power
            ));
        }
        output.push('\n');
    }

    let decision = if cmp.reject_null {
        format!("Reject H0 at the {} significance level", cmp.level).green().bold()
    } else {
        format!("Fail to reject H0 at the {} significance level", cmp.level).red().bold()
    };
    output.push_str(&format!("{} {}\n", "Decision:".cyan().bold(), decision));

    if use_markdown {
        output.push_str("```\n");
    }

    output
}

/// Format one breakdown as an aligned table
fn format_breakdown(breakdown: &Breakdown) -> String {
    let mut output = format!(
        "{}\n",
        format!("Overturn Rate by {}", format_field(breakdown.field)).yellow().bold()
    );
    let width = breakdown
        .categories
        .iter()
        .map(|c| c.category.chars().count())
        .max()
        .unwrap_or(0)
        .max(8);

    for c in &breakdown.categories {
        output.push_str(&format!(
            "  {:<width$} {:>6} / {:<6} {:>6.1}%\n",
            c.category,
            c.overturned,
            c.total,
            c.percent_overturned * 100.0,
            width = width
        ));
    }
    output.push('\n');
    output
}

/// Split a column name into words, e.g. `AgeRange` into `Age Range`
pub fn format_field(field: ReviewField) -> String {
    let mut title = String::new();
    for (i, c) in field.column().chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            title.push(' ');
        }
        title.push(c);
    }
    title
}

/// Export a report to a JSON file
///
/// # Arguments
///
/// * `report` - The finished analysis
/// * `output_path` - Path where the JSON file will be written
///
/// # Returns
///
/// Result indicating success or failure
pub fn export_report_json(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create JSON output file: {}", output_path.display()))?;

    serde_json::to_writer_pretty(file, report).context("Failed to write JSON data")?;

    Ok(())
}

/// Create an HTML report
///
/// # Arguments
///
/// * `report` - The finished analysis
/// * `output_path` - Path where the HTML file will be written
///
/// # Returns
///
/// Result indicating success or failure
pub fn create_html_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let mut handlebars = Handlebars::new();

    const HTML_TEMPLATE: &str = r#"
    <!DOCTYPE html>
    <html lang="en">
    <head>
        <meta charset="UTF-8">
        <meta name="viewport" content="width=device-width, initial-scale=1.0">
        <title>Independent Medical Review Analysis</title>
        <style>
            body {
                font-family: Arial, sans-serif;
                line-height: 1.6;
                color: #333;
                max-width: 1200px;
                margin: 0 auto;
                padding: 20px;
            }
            h1 {
                color: #2c3e50;
                border-bottom: 2px solid #3498db;
                padding-bottom: 10px;
            }
            h2 {
                color: #2980b9;
                margin-top: 30px;
            }
            table {
                border-collapse: collapse;
                margin-bottom: 20px;
            }
            th, td {
                padding: 5px 12px;
                border-bottom: 1px solid #eee;
                text-align: right;
            }
            th:first-child, td:first-child {
                text-align: left;
            }
            .timestamp {
                color: #7f8c8d;
                font-size: 0.9em;
                margin-bottom: 30px;
            }
            .summary {
                background-color: #e8f4f8;
                padding: 15px;
                border-radius: 5px;
                margin-bottom: 30px;
            }
            .selected {
                font-weight: bold;
                background-color: #f8f9fa;
            }
        </style>
    </head>
    <body>
        <h1>Independent Medical Review Analysis</h1>
        <div class="timestamp">Generated on: {{timestamp}}</div>

        <div class="summary">
            <h2>Dataset Summary</h2>
            {{#each summary}}
            <p>{{label}}: {{value}}</p>
            {{/each}}
        </div>

        <h2>Group Comparison: {{comparison.field}} = {{comparison.value}}</h2>
        <table>
            {{#each comparison.rows}}
            <tr><td>{{label}}</td><td>{{value}}</td></tr>
            {{/each}}
        </table>
        <p><strong>{{comparison.decision}}</strong></p>

        <h2>Significance and Power</h2>
        <table>
            <tr><th>Level</th><th>Critical value</th><th>Alpha</th><th>Beta</th><th>Power</th></tr>
            {{#each power}}
            <tr{{#if selected}} class="selected"{{/if}}><td>{{level}}</td><td>{{critical}}</td><td>{{alpha}}</td><td>{{beta}}</td><td>{{power}}</td></tr>
            {{/each}}
        </table>

        <h2>Outcomes by Report Year</h2>
        <table>
            <tr><th>Year</th><th>Reviewed</th><th>Overturned</th><th>Upheld</th><th>% Overturned</th></tr>
            {{#each years}}
            <tr><td>{{year}}</td><td>{{total}}</td><td>{{overturned}}</td><td>{{upheld}}</td><td>{{percent}}</td></tr>
            {{/each}}
        </table>

        {{#each breakdowns}}
        <h2>Outcomes by {{name}}</h2>
        <table>
            <tr><th>{{name}}</th><th>Overturned</th><th>Upheld</th><th>Total</th><th>% Overturned</th></tr>
            {{#each categories}}
            <tr><td>{{category}}</td><td>{{overturned}}</td><td>{{upheld}}</td><td>{{total}}</td><td>{{percent}}</td></tr>
            {{/each}}
        </table>
        {{/each}}
    </body>
    </html>
    "#;

    handlebars
        .register_template_string("report", HTML_TEMPLATE)
        .context("Failed to register HTML template")?;

    let html = handlebars
        .render("report", &html_template_data(report))
        .context("Failed to render HTML template")?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create HTML output file: {}", output_path.display()))?;

    file.write_all(html.as_bytes())
        .context("Failed to write HTML data")?;

    Ok(())
}

fn labelled(label: &str, value: String) -> Value {
    json!({ "label": label, "value": value })
}

/// Flatten a report into display strings for the HTML template
fn html_template_data(report: &AnalysisReport) -> Value {
    let s = &report.summary;
    let cmp = &report.comparison;
    let p = &cmp.proportion;
    let w = &cmp.welch;

    let mut summary = Vec::new();
    if let Some(source) = &s.source {
        summary.push(labelled("Source", source.clone()));
    }
    if let Some(fingerprint) = &s.fingerprint {
        summary.push(labelled("SHA-256", fingerprint.clone()));
    }
    summary.push(labelled("Reviews", s.rows.to_string()));
    summary.push(labelled(
        "Overturned",
        format!("{} ({:.1}%)", s.overturned, s.overturn_rate * 100.0),
    ));
    summary.push(labelled(
        "Days to review",
        format!(
            "median {:.1}, mean {:.1} ({} imputed)",
            s.days_to_review_median, s.days_to_review_mean, s.imputed_days
        ),
    ));
    summary.push(labelled("Mean finding length", format!("{:.1}", s.mean_findings_len)));

    let comparison_rows = vec![
        labelled("Group proportion", format!("{:.4}", p.p_a)),
        labelled("Others proportion", format!("{:.4}", p.p_b)),
        labelled("Difference", format!("{:.4}", p.difference)),
        labelled("Pooled standard error", format!("{:.6}", p.std_err)),
        labelled("z statistic", format!("{:.4}", p.z_stat)),
        labelled("Two-sided p-value (z)", format!("{:.4}", p.p_value_two_sided)),
        labelled("Welch's t-statistic", format!("{:.4}", w.t_stat)),
        labelled("Degrees of freedom", format!("{:.2}", w.df)),
        labelled("Two-sided p-value (t)", format!("{:.4}", w.p_value)),
        labelled("Group size / variance", format!("{} / {:.4}", w.n_a, w.var_a)),
        labelled("Others size / variance", format!("{} / {:.4}", w.n_b, w.var_b)),
    ];

    let decision = if cmp.reject_null {
        format!("Reject H0 at the {} significance level", cmp.level)
    } else {
        format!("Fail to reject H0 at the {} significance level", cmp.level)
    };

    let power: Vec<Value> = cmp
        .power
        .iter()
        .map(|a| {
            json!({
                "level": a.level.to_string(),
                "critical": format!("{:.4}", a.critical_value),
                "alpha": format!("{:.3}", a.alpha),
                "beta": format!("{:.3}", a.beta),
                "power": format!("{:.3}", a.power),
                "selected": a.level == cmp.level,
            })
        })
        .collect();

    let years: Vec<Value> = report
        .annual_trend
        .iter()
        .map(|y| {
            json!({
                "year": y.year,
                "total": y.total_reviewed,
                "overturned": y.num_overturned,
                "upheld": y.num_upheld,
                "percent": format!("{:.1}%", y.percent_overturned * 100.0),
            })
        })
        .collect();

    let breakdowns: Vec<Value> = report
        .breakdowns
        .iter()
        .map(|b| {
            let categories: Vec<Value> = b
                .categories
                .iter()
                .map(|c| {
                    json!({
                        "category": c.category,
                        "overturned": c.overturned,
                        "upheld": c.upheld,
                        "total": c.total,
                        "percent": format!("{:.1}%", c.percent_overturned * 100.0),
                    })
                })
                .collect();
            json!({ "name": format_field(b.field), "categories": categories })
        })
        .collect();

    json!({
        "timestamp": report.generated_at,
        "summary": summary,
        "comparison": {
            "field": format_field(cmp.field),
            "value": cmp.value,
            "rows": comparison_rows,
            "decision": decision,
        },
        "power": power,
        "years": years,
        "breakdowns": breakdowns,
    })
}

/// Create a CSV report of every reported metric
///
/// # Arguments
///
/// * `report` - The finished analysis
/// * `output_path` - Path where the CSV file will be written
///
/// # Returns
///
/// Result indicating success or failure
pub fn create_csv_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create CSV output file: {}", output_path.display()))?;

    let mut writer = csv::Writer::from_writer(file);

    writer
        .write_record(["Section", "Metric", "Value"])
        .context("Failed to write CSV header")?;

    for (section, metric, value) in csv_rows(report) {
        writer
            .write_record([section.as_str(), metric.as_str(), value.as_str()])
            .context("Failed to write CSV record")?;
    }

    writer.flush().context("Failed to flush CSV writer")?;

    Ok(())
}

/// (section, metric, value) rows for the CSV report
pub fn csv_rows(report: &AnalysisReport) -> Vec<(String, String, String)> {
    let mut rows = Vec::new();
    let mut push = |section: &str, metric: &str, value: String| {
        rows.push((section.to_string(), metric.to_string(), value));
    };

    let s = &report.summary;
    push("summary", "rows", s.rows.to_string());
    push("summary", "overturned", s.overturned.to_string());
    push("summary", "upheld", s.upheld.to_string());
    push("summary", "overturn_rate", s.overturn_rate.to_string());
    push("summary", "days_to_review_median", s.days_to_review_median.to_string());
    push("summary", "days_to_review_mean", s.days_to_review_mean.to_string());
    push("summary", "imputed_days", s.imputed_days.to_string());
    push("summary", "mean_findings_len", s.mean_findings_len.to_string());

    let cmp = &report.comparison;
    let p = &cmp.proportion;
    push("proportion_test", "group", format!("{}={}", cmp.field, cmp.value));
    push("proportion_test", "p_group", p.p_a.to_string());
    push("proportion_test", "p_others", p.p_b.to_string());
    push("proportion_test", "difference", p.difference.to_string());
    push("proportion_test", "p_pooled", p.p_pooled.to_string());
    push("proportion_test", "std_err", p.std_err.to_string());
    push("proportion_test", "z_stat", p.z_stat.to_string());
    push("proportion_test", "p_value_one_sided", p.p_value_one_sided.to_string());
    push("proportion_test", "p_value_two_sided", p.p_value_two_sided.to_string());

    let w = &cmp.welch;
    push("welch_t_test", "t_stat", w.t_stat.to_string());
    push("welch_t_test", "df", w.df.to_string());
    push("welch_t_test", "p_value", w.p_value.to_string());
    push("welch_t_test", "var_group", w.var_a.to_string());
    push("welch_t_test", "var_others", w.var_b.to_string());

    for a in &cmp.power {
        let section = format!("power_{}", a.level);
        push(&section, "critical_value", a.critical_value.to_string());
        push(&section, "alpha", a.alpha.to_string());
        push(&section, "beta", a.beta.to_string());
        push(&section, "power", a.power.to_string());
    }
    push("decision", "reject_null", cmp.reject_null.to_string());

    for y in &report.annual_trend {
        let metric = y.year.to_string();
        push("annual_total", &metric, y.total_reviewed.to_string());
        push("annual_overturned", &metric, y.num_overturned.to_string());
    }

    for b in &report.breakdowns {
        let section = format!("overturn_rate_{}", b.field.column());
        for c in &b.categories {
            push(&section, &c.category, c.percent_overturned.to_string());
        }
    }

    rows
}
