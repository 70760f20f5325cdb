/// Two-sample hypothesis tests on review outcomes
///
/// Builds the null and alternative sampling distributions of the difference in
/// overturn proportions between two groups, and runs Welch's unequal-variance
/// t-test on the same samples.

use log::debug;
use serde::Serialize;
use statrs::distribution::{Continuous, ContinuousCDF, Normal, StudentsT};

use crate::core::error::{ImrError, ImrResult};

/// Arithmetic mean, or `None` for an empty slice
pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// Unbiased sample variance (n - 1 denominator), or `None` below two observations
pub fn sample_variance(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    Some(ss / (xs.len() as f64 - 1.0))
}

/// Normal sampling distribution of a difference in proportions
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SamplingDistribution {
    mean: f64,
    std_err: f64,
    #[serde(skip)]
    normal: Normal,
}

impl SamplingDistribution {
    pub fn new(mean: f64, std_err: f64) -> ImrResult<Self> {
        if !(std_err.is_finite() && std_err > 0.0) {
            return Err(ImrError::ZeroStandardError);
        }
        let normal =
            Normal::new(mean, std_err).map_err(|e| ImrError::Distribution(e.to_string()))?;
        Ok(Self {
            mean,
            std_err,
            normal,
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_err(&self) -> f64 {
        self.std_err
    }

    pub fn pdf(&self, x: f64) -> f64 {
        self.normal.pdf(x)
    }

    pub fn cdf(&self, x: f64) -> f64 {
        self.normal.cdf(x)
    }
}

/// Two-proportion comparison under a pooled null hypothesis of no difference
#[derive(Debug, Clone, Serialize)]
pub struct ProportionTest {
    pub n_a: usize,
    pub n_b: usize,
    /// Observed proportion in the first group
    pub p_a: f64,
    /// Observed proportion in the second group
    pub p_b: f64,
    /// Proportion over both groups combined
    pub p_pooled: f64,
    pub shared_variance: f64,
    pub std_err: f64,
    /// `p_a - p_b`, the mean of the alternative distribution
    pub difference: f64,
    pub z_stat: f64,
    /// Null mass at or above the observed difference
    pub p_value_one_sided: f64,
    pub p_value_two_sided: f64,
    pub null: SamplingDistribution,
    pub alternative: SamplingDistribution,
}

impl ProportionTest {
    /// Compare two samples of 0/1 outcomes
    pub fn new(sample_a: &[f64], sample_b: &[f64]) -> ImrResult<Self> {
        let p_a = mean(sample_a).ok_or(ImrError::EmptySample("group"))?;
        let p_b = mean(sample_b).ok_or(ImrError::EmptySample("others"))?;
        let n_a = sample_a.len();
        let n_b = sample_b.len();

        let total: f64 = sample_a.iter().chain(sample_b).sum();
        let p_pooled = total / (n_a + n_b) as f64;

        let spread = p_pooled * (1.0 - p_pooled);
        let shared_variance = spread / n_a as f64 + spread / n_b as f64;
        let std_err = shared_variance.sqrt();
        let difference = p_a - p_b;

        let null = SamplingDistribution::new(0.0, std_err)?;
        let alternative = SamplingDistribution::new(difference, std_err)?;

        let p_value_one_sided = 1.0 - null.cdf(difference);
        let p_value_two_sided = (2.0 * (1.0 - null.cdf(difference.abs()))).min(1.0);

        debug!(
            "Proportion test: p_a={:.4} p_b={:.4} pooled={:.4} se={:.6}",
            p_a, p_b, p_pooled, std_err
        );

        Ok(Self {
            n_a,
            n_b,
            p_a,
            p_b,
            p_pooled,
            shared_variance,
            std_err,
            difference,
            z_stat: difference / std_err,
            p_value_one_sided,
            p_value_two_sided,
            null,
            alternative,
        })
    }
}

/// Result of Welch's unequal-variance t-test
#[derive(Debug, Clone, Serialize)]
pub struct WelchTest {
    pub n_a: usize,
    pub n_b: usize,
    pub mean_a: f64,
    pub mean_b: f64,
    pub var_a: f64,
    pub var_b: f64,
    pub t_stat: f64,
    /// Welch–Satterthwaite degrees of freedom
    pub df: f64,
    /// Two-sided p-value from Student's t
    pub p_value: f64,
}

/// Welch's t-test for a difference in means with unequal variances
pub fn welch_t_test(sample_a: &[f64], sample_b: &[f64]) -> ImrResult<WelchTest> {
    let var_a = sample_variance(sample_a).ok_or(ImrError::InsufficientSamples {
        name: "group",
        required: 2,
        found: sample_a.len(),
    })?;
    let var_b = sample_variance(sample_b).ok_or(ImrError::InsufficientSamples {
        name: "others",
        required: 2,
        found: sample_b.len(),
    })?;
    let mean_a = mean(sample_a).ok_or(ImrError::EmptySample("group"))?;
    let mean_b = mean(sample_b).ok_or(ImrError::EmptySample("others"))?;

    let n_a = sample_a.len() as f64;
    let n_b = sample_b.len() as f64;
    let se_a = var_a / n_a;
    let se_b = var_b / n_b;
    let se2 = se_a + se_b;
    if se2 <= 0.0 {
        return Err(ImrError::ZeroStandardError);
    }

    let t_stat = (mean_a - mean_b) / se2.sqrt();
    let df = se2.powi(2) / (se_a.powi(2) / (n_a - 1.0) + se_b.powi(2) / (n_b - 1.0));

    let t_dist =
        StudentsT::new(0.0, 1.0, df).map_err(|e| ImrError::Distribution(e.to_string()))?;
    let p_value = (2.0 * (1.0 - t_dist.cdf(t_stat.abs()))).clamp(0.0, 1.0);

    debug!("Welch t-test: t={:.4} df={:.2} p={:.4}", t_stat, df, p_value);

    Ok(WelchTest {
        n_a: sample_a.len(),
        n_b: sample_b.len(),
        mean_a,
        mean_b,
        var_a,
        var_b,
        t_stat,
        df,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: [f64; 5] = [1.0, 1.0, 0.0, 0.0, 1.0];
    const OTHERS: [f64; 5] = [0.0, 0.0, 0.0, 1.0, 0.0];

    /// Textbook Welch statistic computed from running sums
    fn reference_t(a: &[f64], b: &[f64]) -> f64 {
        fn moments(xs: &[f64]) -> (f64, f64, f64) {
            let n = xs.len() as f64;
            let s: f64 = xs.iter().sum();
            let s2: f64 = xs.iter().map(|x| x * x).sum();
            let m = s / n;
            (n, m, (s2 - n * m * m) / (n - 1.0))
        }
        let (na, ma, va) = moments(a);
        let (nb, mb, vb) = moments(b);
        (ma - mb) / (va / na + vb / nb).sqrt()
    }

    #[test]
    fn test_example_proportions() {
        let test = ProportionTest::new(&GROUP, &OTHERS).unwrap();
        assert!((test.p_a - 0.6).abs() < 1e-12);
        assert!((test.p_b - 0.2).abs() < 1e-12);
        assert!((test.difference - 0.4).abs() < 1e-12);
        assert!((test.p_pooled - 0.4).abs() < 1e-12);
        assert!((test.shared_variance - 0.096).abs() < 1e-12);
        assert_eq!(test.null.mean(), 0.0);
        assert!((test.alternative.mean() - 0.4).abs() < 1e-12);
        assert_eq!(test.null.std_err(), test.alternative.std_err());
    }

    #[test]
    fn test_example_welch_matches_reference() {
        let welch = welch_t_test(&GROUP, &OTHERS).unwrap();
        // scipy.stats.ttest_ind(a, b, equal_var=False).statistic
        assert!((welch.t_stat - 1.2649).abs() < 1e-4);
        assert!((welch.t_stat - reference_t(&GROUP, &OTHERS)).abs() < 1e-6);
        assert!((welch.df - 7.692307692307692).abs() < 1e-9);
        assert!(welch.p_value > 0.2 && welch.p_value < 0.3);
    }

    #[test]
    fn test_welch_matches_reference_on_varied_samples() {
        let cases: [(&[f64], &[f64]); 3] = [
            (&[2.1, 3.4, 1.9, 5.6, 4.2], &[1.0, 0.4, 2.2]),
            (&[10.0, 12.0, 9.5, 11.25], &[20.0, 18.5, 22.0, 19.0, 21.0, 17.5]),
            (&[0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0], &[0.0, 0.0, 1.0, 0.0]),
        ];
        for (a, b) in cases {
            let welch = welch_t_test(a, b).unwrap();
            assert!((welch.t_stat - reference_t(a, b)).abs() < 1e-6);
            assert!((0.0..=1.0).contains(&welch.p_value));
        }
    }

    #[test]
    fn test_welch_sign_follows_difference() {
        let forward = welch_t_test(&GROUP, &OTHERS).unwrap();
        let backward = welch_t_test(&OTHERS, &GROUP).unwrap();
        assert!((forward.t_stat + backward.t_stat).abs() < 1e-12);
        assert!((forward.p_value - backward.p_value).abs() < 1e-12);
    }

    #[test]
    fn test_empty_and_constant_samples() {
        assert!(matches!(
            ProportionTest::new(&[], &OTHERS),
            Err(ImrError::EmptySample("group"))
        ));
        assert!(matches!(
            welch_t_test(&[1.0], &OTHERS),
            Err(ImrError::InsufficientSamples { found: 1, .. })
        ));
        assert!(matches!(
            welch_t_test(&[1.0, 1.0], &[0.0, 0.0, 0.0]),
            Err(ImrError::ZeroStandardError)
        ));
        assert!(matches!(
            ProportionTest::new(&[0.0, 0.0], &[0.0, 0.0]),
            Err(ImrError::ZeroStandardError)
        ));
    }

    #[test]
    fn test_sampling_distribution_is_symmetric() {
        let dist = SamplingDistribution::new(0.0, 0.01).unwrap();
        assert!((dist.cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((dist.pdf(0.02) - dist.pdf(-0.02)).abs() < 1e-9);
        assert!(SamplingDistribution::new(0.0, 0.0).is_err());
    }

    #[test]
    fn test_sample_variance() {
        assert_eq!(sample_variance(&[1.0]), None);
        assert!((sample_variance(&GROUP).unwrap() - 0.3).abs() < 1e-12);
        assert!((sample_variance(&OTHERS).unwrap() - 0.2).abs() < 1e-12);
    }
}
