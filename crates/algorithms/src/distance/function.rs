//! Distance-decay functions for weighted windows

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

/// How window cells are weighted
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AnalyzeType {
    /// Every window cell counts once
    #[default]
    Threshold,
    /// Cells are weighted by a decreasing function of their distance to the centre
    #[strum(to_string = "weighted_distance", serialize = "weighted distance")]
    WeightedDistance,
}

/// Monotonically decreasing weight `f(d, dmax)`.
///
/// `d` is the distance of a cell to the window centre in cells, `dmax` the
/// window radius in cells. Every function yields 1 at `d = 0`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DistanceFunction {
    /// `exp(-d² / (dmax/2)²)`
    #[default]
    #[strum(
        to_string = "gaussian",
        serialize = "exp(-pow(distance, 2)/pow(dmax/2, 2))"
    )]
    Gaussian,
    /// `max(0, 1 - d/dmax)`
    Linear,
    /// `1 / (1 + d)`
    Inverse,
    /// `1 / (1 + d²)`
    InverseSquare,
}

impl DistanceFunction {
    /// Weight of a cell at distance `d` in a window of radius `dmax`
    pub fn weight(&self, d: f64, dmax: f64) -> f64 {
        if d <= 0.0 {
            return 1.0;
        }
        match self {
            DistanceFunction::Gaussian => {
                if dmax <= 0.0 {
                    return 0.0;
                }
                let h = dmax / 2.0;
                (-(d * d) / (h * h)).exp()
            }
            DistanceFunction::Linear => {
                if dmax <= 0.0 {
                    return 0.0;
                }
                (1.0 - d / dmax).max(0.0)
            }
            DistanceFunction::Inverse => 1.0 / (1.0 + d),
            DistanceFunction::InverseSquare => 1.0 / (1.0 + d * d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    #[test]
    fn test_parse_names() {
        assert_eq!("gaussian".parse::<DistanceFunction>().unwrap(), DistanceFunction::Gaussian);
        assert_eq!(
            "exp(-pow(distance, 2)/pow(dmax/2, 2))".parse::<DistanceFunction>().unwrap(),
            DistanceFunction::Gaussian
        );
        assert_eq!("inverse_square".parse::<DistanceFunction>().unwrap(), DistanceFunction::InverseSquare);
        assert_eq!(DistanceFunction::Gaussian.to_string(), "gaussian");
        assert_eq!("weighted distance".parse::<AnalyzeType>().unwrap(), AnalyzeType::WeightedDistance);
        assert_eq!("THRESHOLD".parse::<AnalyzeType>().unwrap(), AnalyzeType::Threshold);
    }

    #[test]
    fn test_functions_are_monotonic() {
        for f in DistanceFunction::iter() {
            assert_relative_eq!(f.weight(0.0, 3.0), 1.0);
            let mut prev = 1.0;
            for i in 1..=6 {
                let w = f.weight(i as f64 * 0.5, 3.0);
                assert!(w <= prev, "{f} not decreasing at {i}");
                assert!(w >= 0.0);
                prev = w;
            }
        }
    }

    #[test]
    fn test_gaussian_value() {
        // d = dmax/2 gives exp(-1)
        assert_relative_eq!(DistanceFunction::Gaussian.weight(1.0, 2.0), (-1.0f64).exp());
        assert_relative_eq!(DistanceFunction::Linear.weight(1.0, 2.0), 0.5);
    }
}
