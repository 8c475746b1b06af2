use std::num::NonZeroUsize;

use ndarray::Array1;
use serde::Serialize;
use tracing::debug;

use crate::calibration::CalibrationResult;
use crate::math::{self, from_f64, from_usize, Real};
use crate::{Error, Result};

/// Confidence level of a prediction interval, in percent
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
pub struct ConfidenceLevel(f64);

impl ConfidenceLevel {
    /// # Errors
    /// Returns an error unless `percent` lies strictly between 0 and 100.
    pub fn new(percent: f64) -> Result<Self> {
        if percent > 0.0 && percent < 100.0 {
            Ok(Self(percent))
        } else {
            Err(Error::InvalidConfidenceLevel(percent))
        }
    }

    pub const fn percent(self) -> f64 {
        self.0
    }

    /// Lower tail probability of the two-sided critical value, $1 - \alpha / 2$
    fn upper_quantile(self) -> f64 {
        let alpha = 1.0 - self.0 / 100.0;
        1.0 - alpha / 2.0
    }
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self(95.0)
    }
}

/// Bounds on an estimated concentration
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PredictionInterval<E> {
    /// Standard error of the individual prediction
    pub standard_error: E,
    pub lower: E,
    pub upper: E,
}

/// A measured sample response and the concentration read back from the calibration line
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SampleResponse<E> {
    pub response: E,
    pub concentration: E,
    /// Absent when the calibration has too few degrees of freedom, or a zero slope
    pub interval: Option<PredictionInterval<E>>,
}

/// Spread of concentrations estimated from replicate measurements
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReplicateSummary<E> {
    pub mean: E,
    pub standard_deviation: E,
    /// Coefficient of variation in percent, zero when the mean is zero
    pub coefficient_of_variation: E,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleReport<E> {
    pub confidence_level: ConfidenceLevel,
    pub samples: Vec<SampleResponse<E>>,
    /// Present when at least two responses were given
    pub replicates: Option<ReplicateSummary<E>>,
}

impl<E: Real> CalibrationResult<E> {
    /// Invert the calibration line to estimate the concentration giving `response`
    ///
    /// Concentrations cannot be negative, so estimates below zero are clamped to zero. A zero
    /// slope cannot be inverted and also reports zero.
    pub fn concentration(&self, response: E) -> E {
        if self.is_degenerate() {
            return E::zero();
        }
        ((response - self.intercept()) / self.slope()).max(E::zero())
    }

    /// Standard error of a concentration predicted from a single `response`
    ///
    /// $$
    ///     s_{pred} = s_{res} \sqrt{1 + \frac{1}{n} + \frac{(y - \bar{y})^2}{m^2 S_{xx}}}
    /// $$
    ///
    /// `None` when the line has no residual degrees of freedom or cannot be inverted.
    pub fn prediction_standard_error(&self, response: E) -> Option<E> {
        if self.num_points() <= 2 || self.sxx() <= E::zero() || self.is_degenerate() {
            return None;
        }
        let n: E = from_usize(self.num_points());
        let leverage =
            (response - self.mean_response()).powi(2) / (self.slope().powi(2) * self.sxx());
        Some(self.residual_std_dev() * (E::one() + E::one() / n + leverage).sqrt())
    }
}

/// Estimate a concentration for each response, with prediction intervals at `confidence_level`
///
/// # Errors
/// Returns an error if the Student t distribution cannot be evaluated.
pub fn predict<E: Real>(
    calibration: &CalibrationResult<E>,
    responses: &[E],
    confidence_level: ConfidenceLevel,
) -> Result<SampleReport<E>> {
    let degrees_of_freedom = calibration.num_points().saturating_sub(2);
    let t_value: E = from_f64(math::t_critical(
        confidence_level.upper_quantile(),
        degrees_of_freedom,
    )?);

    let samples: Vec<SampleResponse<E>> = responses
        .iter()
        .map(|&response| {
            let concentration = calibration.concentration(response);
            let interval = calibration
                .prediction_standard_error(response)
                .map(|standard_error| PredictionInterval {
                    standard_error,
                    lower: concentration - t_value * standard_error,
                    upper: concentration + t_value * standard_error,
                });
            SampleResponse {
                response,
                concentration,
                interval,
            }
        })
        .collect();

    let concentrations: Array1<E> = samples.iter().map(|sample| sample.concentration).collect();
    let replicates = summarise_replicates(&concentrations);

    debug!(
        num_samples = samples.len(),
        confidence_level = confidence_level.percent(),
        "predicted sample concentrations"
    );

    Ok(SampleReport {
        confidence_level,
        samples,
        replicates,
    })
}

/// Repeat a single measured response `count` times, as for replicate injections
pub fn replicated<E: Real>(response: E, count: NonZeroUsize) -> Vec<E> {
    vec![response; count.get()]
}

fn summarise_replicates<E: Real>(concentrations: &Array1<E>) -> Option<ReplicateSummary<E>> {
    if concentrations.len() < 2 {
        return None;
    }
    let mean = math::mean(&concentrations.view())?;
    let standard_deviation = math::sample_standard_deviation(&concentrations.view());
    let coefficient_of_variation = if mean.is_zero() {
        E::zero()
    } else {
        standard_deviation / mean * from_f64::<E>(100.0)
    };
    Some(ReplicateSummary {
        mean,
        standard_deviation,
        coefficient_of_variation,
    })
}

#[cfg(test)]
mod test {
    use std::num::NonZeroUsize;

    use proptest::prelude::*;

    use super::{predict, replicated, ConfidenceLevel};
    use crate::calibration::test::dilution_series;
    use crate::calibration::CalibrationSet;
    use crate::Error;

    #[test]
    fn responses_are_inverted_through_the_line() {
        let calibration = dilution_series().fit().unwrap();
        approx::assert_relative_eq!(
            calibration.concentration(0.5),
            1.629_377_653,
            max_relative = 1e-8
        );
        approx::assert_relative_eq!(
            calibration.concentration(calibration.evaluate(7.5)),
            7.5,
            max_relative = 1e-12
        );
    }

    #[test]
    fn responses_below_the_intercept_clamp_to_zero() {
        let calibration = dilution_series().fit().unwrap();
        assert_eq!(calibration.concentration(0.0), 0.0);
        assert_eq!(calibration.concentration(-3.0), 0.0);
    }

    #[test]
    fn degenerate_calibrations_predict_zero_without_intervals() {
        let set = CalibrationSet::from_columns(vec![0.0, 1.0, 2.0], vec![2.0, 2.0, 2.0]).unwrap();
        let calibration = set.fit().unwrap();
        let report = predict(&calibration, &[2.0, 5.0], ConfidenceLevel::default()).unwrap();

        for sample in &report.samples {
            assert_eq!(sample.concentration, 0.0);
            assert!(sample.interval.is_none());
        }
    }

    #[test]
    fn replicates_report_mean_spread_and_cv() {
        let calibration = dilution_series().fit().unwrap();
        let report = predict(&calibration, &[0.45, 0.48, 0.47], ConfidenceLevel::default()).unwrap();

        let replicates = report.replicates.unwrap();
        approx::assert_relative_eq!(replicates.mean, 1.518_388_670, max_relative = 1e-8);
        approx::assert_relative_eq!(
            replicates.standard_deviation,
            0.050_861_542,
            max_relative = 1e-7
        );
        approx::assert_relative_eq!(
            replicates.coefficient_of_variation,
            3.349_705_033,
            max_relative = 1e-7
        );
    }

    #[test]
    fn a_single_response_has_no_replicate_summary() {
        let calibration = dilution_series().fit().unwrap();
        let report = predict(&calibration, &[0.45], ConfidenceLevel::default()).unwrap();
        assert!(report.replicates.is_none());
    }

    #[test]
    fn zero_mean_replicates_have_zero_cv() {
        let calibration = dilution_series().fit().unwrap();
        let report = predict(&calibration, &[-1.0, -2.0], ConfidenceLevel::default()).unwrap();
        let replicates = report.replicates.unwrap();
        assert_eq!(replicates.mean, 0.0);
        assert_eq!(replicates.coefficient_of_variation, 0.0);
    }

    #[test]
    fn prediction_intervals_match_reference_values() {
        let calibration = dilution_series().fit().unwrap();
        let report = predict(&calibration, &[0.5, 1.25], ConfidenceLevel::default()).unwrap();

        let interval = report.samples[0].interval.unwrap();
        approx::assert_relative_eq!(interval.standard_error, 0.009_071_929, max_relative = 1e-6);
        approx::assert_relative_eq!(interval.lower, 1.604_189_940, max_relative = 1e-6);
        approx::assert_relative_eq!(interval.upper, 1.654_565_367, max_relative = 1e-6);

        let interval = report.samples[1].interval.unwrap();
        approx::assert_relative_eq!(interval.lower, 4.101_590_060, max_relative = 1e-6);
        approx::assert_relative_eq!(interval.upper, 4.151_669_491, max_relative = 1e-6);
    }

    #[test]
    fn clamped_estimates_keep_an_interval_centred_on_zero() {
        let calibration = dilution_series().fit().unwrap();
        let report = predict(&calibration, &[0.0], ConfidenceLevel::default()).unwrap();

        let sample = report.samples[0];
        assert_eq!(sample.concentration, 0.0);
        let interval = sample.interval.unwrap();
        assert!(interval.lower < 0.0);
        approx::assert_relative_eq!(interval.lower, -interval.upper);
        approx::assert_relative_eq!(
            interval.upper,
            2.776_445 * interval.standard_error,
            max_relative = 1e-5
        );
    }

    #[test]
    fn wider_confidence_gives_wider_intervals() {
        let calibration = dilution_series().fit().unwrap();
        let narrow = predict(&calibration, &[0.5], ConfidenceLevel::new(90.0).unwrap()).unwrap();
        let wide = predict(&calibration, &[0.5], ConfidenceLevel::new(99.0).unwrap()).unwrap();

        let narrow = narrow.samples[0].interval.unwrap();
        let wide = wide.samples[0].interval.unwrap();
        assert!(wide.upper - wide.lower > narrow.upper - narrow.lower);
    }

    #[test]
    fn two_point_calibrations_have_no_intervals() {
        let set = CalibrationSet::from_columns(vec![0.0, 2.0], vec![1.0, 5.0]).unwrap();
        let calibration = set.fit().unwrap();
        let report = predict(&calibration, &[3.0], ConfidenceLevel::default()).unwrap();
        approx::assert_relative_eq!(report.samples[0].concentration, 1.0);
        assert!(report.samples[0].interval.is_none());
    }

    #[test]
    fn confidence_levels_outside_open_percent_range_are_rejected() {
        for percent in [0.0, 100.0, -5.0, 150.0, f64::NAN] {
            assert!(matches!(
                ConfidenceLevel::new(percent),
                Err(Error::InvalidConfidenceLevel(_))
            ));
        }
    }

    #[test]
    fn replicated_responses_repeat_the_value() {
        let count = NonZeroUsize::new(3).unwrap();
        assert_eq!(replicated(0.5, count), vec![0.5, 0.5, 0.5]);
    }

    proptest! {
        #[test]
        fn predicted_concentrations_are_never_negative(response in -1.0e3f64..1.0e3) {
            let calibration = dilution_series().fit().unwrap();
            prop_assert!(calibration.concentration(response) >= 0.0);
        }
    }
}
