/// SVG chart rendering for analysis reports
///
/// Every chart is drawn from a finished `AnalysisReport`, so charts can be
/// rendered independently and in parallel.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::{debug, error, info};
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::style::full_palette::{GREY, PURPLE};
use plotters::style::FontTransform;
use rayon::prelude::*;

use crate::core::analyzer::{AnalysisReport, GroupComparison, BREAKDOWN_FIELDS};
use crate::core::dataset::ReviewField;
use crate::core::eda::Breakdown;
use crate::core::hypothesis::SamplingDistribution;
use crate::core::power::SignificanceLevel;

const WIDE: (u32, u32) = (1200, 500);
const TALL: (u32, u32) = (1400, 700);
const CURVE_POINTS: usize = 400;

/// Charts that can be rendered from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    AnnualTrend,
    Breakdown(ReviewField),
    SamplingDistribution,
    AlphaBeta,
    Power,
}

impl ChartKind {
    /// Every chart, in rendering order
    pub fn all() -> Vec<ChartKind> {
        let mut kinds = vec![ChartKind::AnnualTrend];
        kinds.extend(BREAKDOWN_FIELDS.iter().map(|&f| ChartKind::Breakdown(f)));
        kinds.extend([
            ChartKind::SamplingDistribution,
            ChartKind::AlphaBeta,
            ChartKind::Power,
        ]);
        kinds
    }

    pub fn file_name(&self) -> String {
        match self {
            ChartKind::AnnualTrend => "annual_trend.svg".to_string(),
            ChartKind::Breakdown(field) => format!("by_{}.svg", snake_case(field.column())),
            ChartKind::SamplingDistribution => "sampling_distribution.svg".to_string(),
            ChartKind::AlphaBeta => "alpha_beta.svg".to_string(),
            ChartKind::Power => "power.svg".to_string(),
        }
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Evenly spaced points over `[start, end]`
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Render every chart into `dir` on a pool of `workers` threads.
///
/// A chart that fails to render is logged and skipped.
///
/// # Returns
///
/// Paths of the charts that were written
pub fn render_all(
    report: &AnalysisReport,
    dir: &Path,
    workers: usize,
    progress: Option<&ProgressBar>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .context(format!("Failed to create chart directory: {}", dir.display()))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build thread pool: {}", e))?;

    let kinds = ChartKind::all();
    let written = pool.install(|| {
        kinds
            .par_iter()
            .filter_map(|kind| {
                let result = render_chart(*kind, report, dir);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                match result {
                    Ok(path) => Some(path),
                    Err(e) => {
                        error!("Error rendering {}: {:#}", kind.file_name(), e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>()
    });

    info!("Rendered {} of {} charts into {}", written.len(), kinds.len(), dir.display());
    Ok(written)
}

/// Render one chart into `dir`
pub fn render_chart(kind: ChartKind, report: &AnalysisReport, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(kind.file_name());
    debug!("Rendering {:?} to {}", kind, path.display());

    match kind {
        ChartKind::AnnualTrend => plot_annual_trend(report, &path)?,
        ChartKind::Breakdown(field) => {
            let breakdown = report
                .breakdown(field)
                .context(format!("No breakdown for {}", field))?;
            plot_breakdown(breakdown, &path)?
        }
        ChartKind::SamplingDistribution => plot_sampling_distribution(&report.comparison, &path)?,
        ChartKind::AlphaBeta => plot_alpha_beta(&report.comparison, &path)?,
        ChartKind::Power => plot_power(&report.comparison, &path)?,
    }

    Ok(path)
}

/// Stacked yearly determinations with the overturned share on a second axis
fn plot_annual_trend(report: &AnalysisReport, path: &Path) -> Result<()> {
    let trend = &report.annual_trend;
    if trend.is_empty() {
        anyhow::bail!("No report years to plot");
    }

    let years: Vec<String> = trend.iter().map(|y| y.year.to_string()).collect();
    let n = trend.len();
    let y_max = trend.iter().map(|y| y.total_reviewed).max().unwrap_or(1) as f64 * 1.1;

    let root = SVGBackend::new(path, TALL).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Independent Medical Review Outcomes by Report Year",
            ("sans-serif", 28).into_font(),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .right_y_label_area_size(70)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..y_max)?
        .set_secondary_coord((0..n).into_segmented(), 0f64..1f64);

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .x_label_formatter(&|v| segment_label(v, &years))
        .y_desc("Number of Reviews")
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("% of Total Reviews that were Overturned")
        .draw()?;

    chart
        .draw_series(trend.iter().enumerate().map(|(i, y)| {
            stacked_bar(i, 0.0, y.num_overturned as f64, GREEN.mix(0.5))
        }))?
        .label("Overturned")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], GREEN.mix(0.5).filled()));
    chart
        .draw_series(trend.iter().enumerate().map(|(i, y)| {
            stacked_bar(i, y.num_overturned as f64, y.total_reviewed as f64, PURPLE.mix(0.5))
        }))?
        .label("Upheld")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], PURPLE.mix(0.5).filled()));

    chart
        .draw_secondary_series(LineSeries::new(
            trend
                .iter()
                .enumerate()
                .map(|(i, y)| (SegmentValue::CenterOf(i), y.percent_overturned)),
            BLUE.stroke_width(3),
        ))?
        .label("% - Overturned")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(3)));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE)
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Stacked determination counts for each value of one field
fn plot_breakdown(breakdown: &Breakdown, path: &Path) -> Result<()> {
    let categories = &breakdown.categories;
    if categories.is_empty() {
        anyhow::bail!("No categories to plot for {}", breakdown.field);
    }

    let names: Vec<String> = categories.iter().map(|c| c.category.clone()).collect();
    let n = categories.len();
    let y_max = categories.iter().map(|c| c.total).max().unwrap_or(1) as f64 * 1.1;
    let rotate = n > 8;

    let root = SVGBackend::new(path, TALL).into_drawing_area();
    root.fill(&WHITE)?;

    let label_style = if rotate {
        ("sans-serif", 12).into_font().transform(FontTransform::Rotate90)
    } else {
        ("sans-serif", 14).into_font()
    };

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Independent Medical Review Determinations by {}", breakdown.field),
            ("sans-serif", 28).into_font(),
        )
        .margin(20)
        .x_label_area_size(if rotate { 220 } else { 50 })
        .y_label_area_size(70)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .x_label_style(label_style)
        .x_label_formatter(&|v| segment_label(v, &names))
        .x_desc(breakdown.field.column())
        .y_desc("Count")
        .draw()?;

    chart
        .draw_series(categories.iter().enumerate().map(|(i, c)| {
            stacked_bar(i, 0.0, c.overturned as f64, RED.mix(0.7))
        }))?
        .label("Overturned")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], RED.mix(0.7).filled()));
    chart
        .draw_series(categories.iter().enumerate().map(|(i, c)| {
            stacked_bar(i, c.overturned as f64, c.total as f64, BLUE.mix(0.7))
        }))?
        .label("Upheld")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], BLUE.mix(0.7).filled()));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE)
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Null distribution with the 95/98/99% bounds and the p-value region
fn plot_sampling_distribution(cmp: &GroupComparison, path: &Path) -> Result<()> {
    let null = &cmp.proportion.null;
    let diff = cmp.proportion.difference;
    let (x_min, x_max) = x_window(cmp);
    let y_max = peak_density(null) * 1.15;
    let xs = linspace(x_min, x_max, CURVE_POINTS);

    let root = SVGBackend::new(path, WIDE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Sampling Distribution under the H0", ("sans-serif", 28).into_font())
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Difference in overturn rate")
        .y_desc("PDF")
        .draw()?;

    let bound_styles = [
        (SignificanceLevel::P05, GREY.stroke_width(2)),
        (SignificanceLevel::P02, BLUE.mix(0.6).stroke_width(2)),
        (SignificanceLevel::P01, BLUE.stroke_width(2)),
    ];
    for (level, style) in bound_styles {
        let t = cmp.significance.threshold(level);
        chart
            .draw_series([t.lower, t.upper].into_iter().map(|x| vline(x, y_max, style)))?
            .label(format!("{}% CI", level.confidence_percent()))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    chart
        .draw_series(LineSeries::new(
            xs.iter().map(|&x| (x, null.pdf(x))),
            GREEN.stroke_width(4),
        ))?
        .label("H0")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GREEN.stroke_width(4)));

    let tail = diff.abs();
    chart
        .draw_series(AreaSeries::new(
            xs.iter().filter(|&&x| x >= tail).map(|&x| (x, null.pdf(x))),
            0.0,
            GREEN.mix(0.5),
        ))?
        .label("P-Value Region")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], GREEN.mix(0.5).filled()));
    chart.draw_series(AreaSeries::new(
        xs.iter().filter(|&&x| x <= -tail).map(|&x| (x, null.pdf(x))),
        0.0,
        GREEN.mix(0.5),
    ))?;

    chart
        .configure_series_labels()
        .background_style(WHITE)
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Null and alternative distributions with the alpha and beta regions
fn plot_alpha_beta(cmp: &GroupComparison, path: &Path) -> Result<()> {
    let null = &cmp.proportion.null;
    let alt = &cmp.proportion.alternative;
    let critical = cmp.selected.critical_value;
    let (x_min, x_max) = x_window(cmp);
    let y_max = peak_density(null) * 1.15;
    let xs = linspace(x_min, x_max, CURVE_POINTS);

    let root = SVGBackend::new(path, WIDE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Distribution of the Difference in Overturn Rates - {} Significance Level",
                cmp.level
            ),
            ("sans-serif", 24).into_font(),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0f64..y_max)?;

    chart.configure_mesh().disable_mesh().y_desc("PDF").draw()?;

    draw_hypotheses(&mut chart, null, alt, &xs)?;
    chart.draw_series(std::iter::once(vline(critical, y_max, BLACK.stroke_width(2))))?;

    chart
        .draw_series(AreaSeries::new(
            xs.iter().filter(|&&x| x >= critical).map(|&x| (x, null.pdf(x))),
            0.0,
            GREEN.mix(0.3),
        ))?
        .label(format!("alpha = {:.3}", cmp.selected.alpha))
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], GREEN.mix(0.3).filled()));
    chart
        .draw_series(AreaSeries::new(
            xs.iter().filter(|&&x| x <= critical).map(|&x| (x, alt.pdf(x))),
            0.0,
            PURPLE.mix(0.3),
        ))?
        .label(format!("beta = {:.3}", cmp.selected.beta))
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], PURPLE.mix(0.3).filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE)
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Alternative distribution mass beyond the critical value
fn plot_power(cmp: &GroupComparison, path: &Path) -> Result<()> {
    let null = &cmp.proportion.null;
    let alt = &cmp.proportion.alternative;
    let critical = cmp.selected.critical_value;
    let (x_min, x_max) = x_window(cmp);
    let y_max = peak_density(null) * 1.15;
    let xs = linspace(x_min, x_max, CURVE_POINTS);

    let root = SVGBackend::new(path, WIDE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Power Analysis - {} Significance Level", cmp.level),
            ("sans-serif", 28).into_font(),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0f64..y_max)?;

    chart.configure_mesh().disable_mesh().y_desc("PDF").draw()?;

    draw_hypotheses(&mut chart, null, alt, &xs)?;
    chart.draw_series(std::iter::once(vline(critical, y_max, BLACK.stroke_width(2))))?;

    chart
        .draw_series(AreaSeries::new(
            xs.iter().filter(|&&x| x >= critical).map(|&x| (x, alt.pdf(x))),
            0.0,
            RED.mix(0.2),
        ))?
        .label(format!("Power = {:.3}", cmp.selected.power))
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], RED.mix(0.2).filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE)
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

type DistributionChart<'a, 'b> =
    ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_hypotheses(
    chart: &mut DistributionChart<'_, '_>,
    null: &SamplingDistribution,
    alt: &SamplingDistribution,
    xs: &[f64],
) -> Result<()> {
    chart
        .draw_series(LineSeries::new(
            xs.iter().map(|&x| (x, null.pdf(x))),
            GREEN.stroke_width(3),
        ))?
        .label("H0")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GREEN.stroke_width(3)));
    chart
        .draw_series(LineSeries::new(
            xs.iter().map(|&x| (x, alt.pdf(x))),
            PURPLE.stroke_width(3),
        ))?
        .label("HA")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], PURPLE.stroke_width(3)));
    Ok(())
}

fn segment_label(value: &SegmentValue<usize>, names: &[String]) -> String {
    match value {
        SegmentValue::CenterOf(i) => names.get(*i).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

fn stacked_bar(
    slot: usize,
    bottom: f64,
    top: f64,
    color: RGBAColor,
) -> Rectangle<(SegmentValue<usize>, f64)> {
    let mut bar = Rectangle::new(
        [
            (SegmentValue::Exact(slot), bottom),
            (SegmentValue::Exact(slot + 1), top),
        ],
        color.filled(),
    );
    bar.set_margin(0, 0, 6, 6);
    bar
}

fn vline(x: f64, height: f64, style: ShapeStyle) -> PathElement<(f64, f64)> {
    PathElement::new(vec![(x, 0.0), (x, height)], style)
}

fn peak_density(dist: &SamplingDistribution) -> f64 {
    dist.pdf(dist.mean())
}

/// Horizontal window wide enough for both hypotheses
fn x_window(cmp: &GroupComparison) -> (f64, f64) {
    let se = cmp.proportion.std_err;
    let diff = cmp.proportion.difference;
    let lo = diff.min(0.0).min(-diff.abs()) - 4.5 * se;
    let hi = diff.max(0.0).max(diff.abs()) + 4.5 * se;
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::core::analyzer::ImrAnalyzer;
    use crate::core::dataset::ReviewTable;

    fn report() -> AnalysisReport {
        let csv = "ReportYear,Determination,AgeRange,PatientGender,DiagnosisCategory,TreatmentCategory,Type,DaysToReview,Findings\n\
                   2014,Overturned,11 to 20,Female,Mental,Residential,Medical Necessity,10,a\n\
                   2014,Upheld,11 to 20,Male,Mental,Residential,Medical Necessity,12,b\n\
                   2015,Upheld,41 to 50,Female,Cancer,Surgery,Experimental,30,c\n\
                   2015,Overturned,41 to 50,Male,Cancer,Surgery,Experimental,25,d\n\
                   2015,Upheld,51 to 64,Male,Cardiac,Imaging,Medical Necessity,40,e\n";
        let table = ReviewTable::from_reader(csv.as_bytes()).unwrap();
        ImrAnalyzer::new(&AnalysisConfig::default())
            .unwrap()
            .analyze(&table)
            .unwrap()
    }

    #[test]
    fn test_linspace() {
        let xs = linspace(-1.0, 1.0, 5);
        assert_eq!(xs, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ChartKind::AnnualTrend.file_name(), "annual_trend.svg");
        assert_eq!(
            ChartKind::Breakdown(ReviewField::AgeRange).file_name(),
            "by_age_range.svg"
        );
        assert_eq!(
            ChartKind::Breakdown(ReviewField::ReviewType).file_name(),
            "by_type.svg"
        );
    }

    #[test]
    fn test_all_charts_have_unique_names() {
        let mut names: Vec<String> = ChartKind::all().iter().map(|k| k.file_name()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 4 + BREAKDOWN_FIELDS.len());
    }

    #[test]
    fn test_empty_charts_are_not_counted() {
        let mut report = report();
        report.annual_trend.clear();
        if let Some(by_age) = report.breakdowns.iter_mut().find(|b| b.field == ReviewField::AgeRange) {
            by_age.categories.clear();
        }
        let dir = tempfile::tempdir().unwrap();

        assert!(render_chart(ChartKind::AnnualTrend, &report, dir.path()).is_err());
        assert!(!dir.path().join(ChartKind::AnnualTrend.file_name()).exists());

        let written = render_all(&report, dir.path(), 1, None).unwrap();
        assert_eq!(written.len(), ChartKind::all().len() - 2);
        assert!(written.iter().all(|p| p.exists()));
    }
}
