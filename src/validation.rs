use serde::Serialize;

use crate::calibration::{CalibrationResult, CalibrationSet};
use crate::math::{from_f64, from_usize, Real};

/// Method validation figures of merit for a calibration
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MethodValidation<E> {
    pub r_squared: E,
    /// Regression F statistic, absent without residual degrees of freedom or residual scatter
    pub f_value: Option<E>,
    /// Change in response per unit concentration, the slope of the line
    pub sensitivity: E,
    pub lod: E,
    pub loq: E,
    /// Lowest and highest calibrated concentration
    pub working_range: (E, E),
    /// Whether $r^2$ exceeds the linearity threshold
    pub linear: bool,
}

/// Collect validation parameters for `calibration`, fitted from `set`
pub fn validate<E: Real>(
    set: &CalibrationSet<E>,
    calibration: &CalibrationResult<E>,
    linearity_threshold: f64,
) -> MethodValidation<E> {
    let working_range = set
        .concentration_range()
        .unwrap_or((E::zero(), E::zero()));
    MethodValidation {
        r_squared: calibration.r_squared(),
        f_value: f_value(calibration),
        sensitivity: calibration.slope(),
        lod: calibration.lod(),
        loq: calibration.loq(),
        working_range,
        linear: calibration.r_squared() > from_f64::<E>(linearity_threshold),
    }
}

/// $F = \frac{SS_{tot} - SS_{res}}{SS_{res} / (n - 2)}$, one regression degree of freedom
pub fn f_value<E: Real>(calibration: &CalibrationResult<E>) -> Option<E> {
    let num_points = calibration.num_points();
    if num_points <= 2 {
        return None;
    }
    let ss_res = calibration.residual_sum_of_squares();
    if ss_res <= E::zero() {
        return None;
    }
    let ms_residual = ss_res / from_usize::<E>(num_points - 2);
    let ms_regression = calibration.total_sum_of_squares() - ss_res;
    Some(ms_regression / ms_residual)
}
