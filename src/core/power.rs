/// Significance thresholds and statistical power
use std::fmt;

use serde::{Serialize, Serializer};

use crate::core::error::{ImrError, ImrResult};
use crate::core::hypothesis::SamplingDistribution;

/// Supported two-tailed significance levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignificanceLevel {
    /// 0.05, the 95% interval
    P05,
    /// 0.02, the 98% interval
    P02,
    /// 0.01, the 99% interval
    P01,
}

impl SignificanceLevel {
    pub const ALL: [SignificanceLevel; 3] = [
        SignificanceLevel::P05,
        SignificanceLevel::P02,
        SignificanceLevel::P01,
    ];

    pub fn value(self) -> f64 {
        match self {
            SignificanceLevel::P05 => 0.05,
            SignificanceLevel::P02 => 0.02,
            SignificanceLevel::P01 => 0.01,
        }
    }

    /// Standard normal quantile bounding the interval
    pub fn z_score(self) -> f64 {
        match self {
            SignificanceLevel::P05 => 1.96,
            SignificanceLevel::P02 => 2.326,
            SignificanceLevel::P01 => 2.58,
        }
    }

    /// Confidence of the matching interval, in percent
    pub fn confidence_percent(self) -> u8 {
        match self {
            SignificanceLevel::P05 => 95,
            SignificanceLevel::P02 => 98,
            SignificanceLevel::P01 => 99,
        }
    }
}

impl TryFrom<f64> for SignificanceLevel {
    type Error = ImrError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        SignificanceLevel::ALL
            .into_iter()
            .find(|level| (level.value() - value).abs() < 1e-9)
            .ok_or(ImrError::UnknownSignificanceLevel(value))
    }
}

impl fmt::Display for SignificanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.value())
    }
}

impl Serialize for SignificanceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

/// Bounds of the central interval around the null mean for one level
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Threshold {
    pub level: SignificanceLevel,
    pub lower: f64,
    /// Critical value: the upper bound
    pub upper: f64,
}

impl Threshold {
    fn around(mean: f64, std_err: f64, level: SignificanceLevel) -> Self {
        let half_width = level.z_score() * std_err;
        Self {
            level,
            lower: mean - half_width,
            upper: mean + half_width,
        }
    }
}

/// Critical values for every supported level, for a given distribution
#[derive(Debug, Clone, Serialize)]
pub struct SignificanceMap {
    pub mean: f64,
    pub std_err: f64,
    pub thresholds: Vec<Threshold>,
}

impl SignificanceMap {
    pub fn new(mean: f64, std_err: f64) -> Self {
        let thresholds = SignificanceLevel::ALL
            .iter()
            .map(|&level| Threshold::around(mean, std_err, level))
            .collect();

        Self {
            mean,
            std_err,
            thresholds,
        }
    }

    /// Map for a sampling distribution
    pub fn for_distribution(dist: &SamplingDistribution) -> Self {
        Self::new(dist.mean(), dist.std_err())
    }

    pub fn threshold(&self, level: SignificanceLevel) -> Threshold {
        Threshold::around(self.mean, self.std_err, level)
    }

    /// Upper critical value for `level`
    pub fn critical_value(&self, level: SignificanceLevel) -> f64 {
        self.threshold(level).upper
    }
}

/// Type I and type II error rates and power at one significance level
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PowerAnalysis {
    pub level: SignificanceLevel,
    pub critical_value: f64,
    pub alpha: f64,
    pub beta: f64,
    pub power: f64,
}

impl PowerAnalysis {
    pub fn compute(
        level: SignificanceLevel,
        map: &SignificanceMap,
        alternative: &SamplingDistribution,
    ) -> Self {
        let critical_value = map.critical_value(level);
        let alpha = level.value() / 2.0;
        let beta = alternative.cdf(critical_value);

        Self {
            level,
            critical_value,
            alpha,
            beta,
            power: 1.0 - beta,
        }
    }

    /// Analysis at every supported level, loosest first
    pub fn all(map: &SignificanceMap, alternative: &SamplingDistribution) -> Vec<Self> {
        SignificanceLevel::ALL
            .iter()
            .map(|&level| Self::compute(level, map, alternative))
            .collect()
    }

    /// Convenience for a raw level value such as 0.05
    pub fn for_level(
        level: f64,
        map: &SignificanceMap,
        alternative: &SamplingDistribution,
    ) -> ImrResult<Self> {
        Ok(Self::compute(
            SignificanceLevel::try_from(level)?,
            map,
            alternative,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_values_are_ordered() {
        for &(mean, se) in &[(0.0, 0.01), (0.3, 0.2), (-1.5, 4.0), (0.0, 1e-6)] {
            let map = SignificanceMap::new(mean, se);
            let c05 = map.critical_value(SignificanceLevel::P05);
            let c02 = map.critical_value(SignificanceLevel::P02);
            let c01 = map.critical_value(SignificanceLevel::P01);
            assert!(c01 > c02 && c02 > c05 && c05 > mean);
        }
    }

    #[test]
    fn test_thresholds_are_symmetric() {
        let map = SignificanceMap::new(0.0, 0.01);
        let t = map.threshold(SignificanceLevel::P05);
        assert!((t.upper - 0.0196).abs() < 1e-12);
        assert!((t.lower + 0.0196).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        assert!(matches!(
            SignificanceLevel::try_from(0.5),
            Err(ImrError::UnknownSignificanceLevel(_))
        ));
        assert_eq!(
            SignificanceLevel::try_from(0.02).unwrap(),
            SignificanceLevel::P02
        );
    }

    #[test]
    fn test_alpha_beta_power_bounds() {
        for &(diff, se) in &[(0.0, 0.01), (0.02, 0.01), (-0.05, 0.02), (1.0, 0.001)] {
            let null = SamplingDistribution::new(0.0, se).unwrap();
            let alt = SamplingDistribution::new(diff, se).unwrap();
            let map = SignificanceMap::for_distribution(&null);

            for analysis in PowerAnalysis::all(&map, &alt) {
                assert!((0.0..=1.0).contains(&analysis.alpha));
                assert!((0.0..=1.0).contains(&analysis.beta));
                assert!((0.0..=1.0).contains(&analysis.power));
                assert!((analysis.power + analysis.beta - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_power_at_known_point() {
        // Alternative centred on the 95% critical value: beta is one half
        let se = 0.01;
        let null = SamplingDistribution::new(0.0, se).unwrap();
        let alt = SamplingDistribution::new(1.96 * se, se).unwrap();
        let map = SignificanceMap::for_distribution(&null);

        let analysis = PowerAnalysis::for_level(0.05, &map, &alt).unwrap();
        assert!((analysis.alpha - 0.025).abs() < 1e-12);
        assert!((analysis.beta - 0.5).abs() < 1e-9);
        assert!((analysis.power - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_power_shrinks_with_stricter_level() {
        let null = SamplingDistribution::new(0.0, 0.01).unwrap();
        let alt = SamplingDistribution::new(0.025, 0.01).unwrap();
        let map = SignificanceMap::for_distribution(&null);

        let all = PowerAnalysis::all(&map, &alt);
        assert!(all[0].power > all[1].power && all[1].power > all[2].power);
    }
}
