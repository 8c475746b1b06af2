use std::fmt::{Debug, Display};
use std::str::FromStr;

use ndarray::{ArrayView1, ScalarOperand};
use num_traits::{Float, FromPrimitive};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::Result;

/// Floating point types the calibration routines are generic over.
///
/// Distribution functions are evaluated in `f64`, so every implementor must widen losslessly
/// into `f64`. In practice this is `f32` and `f64`.
pub trait Real:
    Float + FromPrimitive + ScalarOperand + FromStr + Debug + Display + Serialize + Into<f64>
{
}

impl<T> Real for T where
    T: Float + FromPrimitive + ScalarOperand + FromStr + Debug + Display + Serialize + Into<f64>
{
}

pub(crate) fn from_f64<E: Real>(value: f64) -> E {
    E::from_f64(value).expect("`f64` must fit in `E`")
}

pub(crate) fn from_usize<E: Real>(value: usize) -> E {
    E::from_usize(value).expect("usize must fit in `E`")
}

/// Arithmetic mean, `None` for an empty view
pub fn mean<E: Real>(values: &ArrayView1<E>) -> Option<E> {
    values.mean()
}

/// Sum of squared deviations from `centre`
///
/// With `centre` set to the mean of `values` this is $S_{xx} = \sum_i (x_i - \bar{x})^2$.
pub fn sum_of_squares<E: Real>(values: &ArrayView1<E>, centre: E) -> E {
    values
        .iter()
        .fold(E::zero(), |acc, &value| acc + (value - centre).powi(2))
}

/// Sum of cross deviations $S_{xy} = \sum_i (x_i - \bar{x})(y_i - \bar{y})$
pub fn sum_of_cross_deviations<E: Real>(
    x: &ArrayView1<E>,
    x_centre: E,
    y: &ArrayView1<E>,
    y_centre: E,
) -> E {
    x.iter()
        .zip(y.iter())
        .fold(E::zero(), |acc, (&xi, &yi)| {
            acc + (xi - x_centre) * (yi - y_centre)
        })
}

/// Sample standard deviation with an `n - 1` divisor, zero for fewer than two values
pub fn sample_standard_deviation<E: Real>(values: &ArrayView1<E>) -> E {
    if values.len() < 2 {
        return E::zero();
    }
    values.std(E::one())
}

/// Quantile of Student's t distribution with `degrees_of_freedom`
///
/// `probability` is the lower tail probability, so the two-sided 95% critical value is
/// `t_critical(0.975, dof)`. Zero degrees of freedom give a critical value of zero, which is how
/// a two point calibration reports confidence half-widths.
///
/// # Errors
/// Returns an error if `probability` is outside the open interval `(0, 1)`.
pub fn t_critical(probability: f64, degrees_of_freedom: usize) -> Result<f64> {
    if !(probability > 0.0 && probability < 1.0) {
        return Err(crate::Error::InvalidProbability(probability));
    }
    if degrees_of_freedom == 0 {
        return Ok(0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let distribution = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)?;
    Ok(distribution.inverse_cdf(probability))
}

/// Two-sided p-value $2 P(T > |t|)$ for a t statistic with `degrees_of_freedom`
///
/// # Errors
/// Returns an error if `degrees_of_freedom` is zero.
pub fn two_sided_p_value(statistic: f64, degrees_of_freedom: usize) -> Result<f64> {
    #[allow(clippy::cast_precision_loss)]
    let distribution = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)?;
    if statistic.is_nan() {
        return Ok(1.0);
    }
    if statistic.is_infinite() {
        return Ok(0.0);
    }
    let p = 2.0 * (1.0 - distribution.cdf(statistic.abs()));
    Ok(p.clamp(0.0, 1.0))
}
