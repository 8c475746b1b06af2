use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::math::{self, from_f64, from_usize, Real};
use crate::table::{self, SkippedRow};
use crate::{Error, Result};

/// Multiplier on the residual standard deviation giving the limit of detection
const LOD_FACTOR: f64 = 3.3;
/// Multiplier on the residual standard deviation giving the limit of quantification
const LOQ_FACTOR: f64 = 10.0;

/// Build calibrations for every analyte in a directory
///
/// Each `*.csv` file in `working_directory` holds the standards for one analyte, named by the
/// file stem. Tables are read with the column selection in `config`. An analyte whose standards
/// cannot define a line is still returned, carrying the reason in [`AnalyteCalibration::fit`].
///
/// # Errors
/// Returns an error if the directory cannot be read, or any file is not a valid table.
pub fn build<E: Real>(working_directory: &Path, config: &Config) -> Result<Vec<AnalyteCalibration<E>>> {
    let csv_file_paths = fs::read_dir(working_directory)?
        .filter_map(::std::result::Result::ok)
        .map(|dir_entry| dir_entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "csv"))
        .sorted();

    let mut calibrations = vec![];
    for path in csv_file_paths {
        let analyte = Analyte(
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        debug!(?path, analyte = %analyte.0, "reading calibration standards");
        let table = table::read_calibration_file(&path, config)?;
        let fit = table.set.fit();
        if let Err(error) = &fit {
            warn!(analyte = %analyte.0, %error, "calibration unavailable");
        }
        calibrations.push(AnalyteCalibration {
            analyte,
            set: table.set,
            skipped: table.skipped,
            fit,
        });
    }

    Ok(calibrations)
}

/// The substance a calibration curve quantifies
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Analyte(pub String);

pub struct AnalyteCalibration<E: Real> {
    pub analyte: Analyte,
    pub set: CalibrationSet<E>,
    /// Rows of the source table that were not numeric
    pub skipped: Vec<SkippedRow>,
    pub fit: Result<CalibrationResult<E>>,
}

/// A single calibration standard
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint<E> {
    /// Known concentration of the standard (x)
    pub concentration: E,
    /// Instrument response measured for the standard (y)
    pub response: E,
}

impl<E> CalibrationPoint<E> {
    pub const fn new(concentration: E, response: E) -> Self {
        Self {
            concentration,
            response,
        }
    }
}

/// An ordered collection of calibration standards
///
/// The order of the standards has no effect on any statistic derived from the set.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationSet<E> {
    concentration: Array1<E>,
    response: Array1<E>,
}

impl<E: Real> CalibrationSet<E> {
    pub fn from_points(points: impl IntoIterator<Item = CalibrationPoint<E>>) -> Self {
        let (concentration, response): (Vec<E>, Vec<E>) = points
            .into_iter()
            .map(|point| (point.concentration, point.response))
            .unzip();
        Self {
            concentration: Array1::from(concentration),
            response: Array1::from(response),
        }
    }

    /// # Errors
    /// Returns an error if the columns have different lengths.
    pub fn from_columns(concentration: Vec<E>, response: Vec<E>) -> Result<Self> {
        if concentration.len() != response.len() {
            return Err(Error::LengthMismatch {
                concentration: concentration.len(),
                response: response.len(),
            });
        }
        Ok(Self {
            concentration: Array1::from(concentration),
            response: Array1::from(response),
        })
    }

    pub fn len(&self) -> usize {
        self.concentration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concentration.is_empty()
    }

    pub fn concentration(&self) -> ArrayView1<'_, E> {
        self.concentration.view()
    }

    pub fn response(&self) -> ArrayView1<'_, E> {
        self.response.view()
    }

    pub fn points(&self) -> impl Iterator<Item = CalibrationPoint<E>> + '_ {
        self.concentration
            .iter()
            .zip(self.response.iter())
            .map(|(&concentration, &response)| CalibrationPoint::new(concentration, response))
    }

    /// Lowest and highest standard concentration
    pub fn concentration_range(&self) -> Option<(E, E)> {
        let ordering = |a: &E, b: &E| a.partial_cmp(b).unwrap_or(Ordering::Equal);
        match self.concentration.iter().copied().minmax_by(ordering) {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(x) => Some((x, x)),
            MinMaxResult::MinMax(min, max) => Some((min, max)),
        }
    }

    /// Descriptive statistics of the raw standards, `None` for an empty set
    pub fn summary(&self) -> Option<SetSummary<E>> {
        let (min_concentration, max_concentration) = self.concentration_range()?;
        Some(SetSummary {
            num_points: self.len(),
            mean_concentration: math::mean(&self.concentration())?,
            mean_response: math::mean(&self.response())?,
            min_concentration,
            max_concentration,
        })
    }

    /// Fit the calibration line, see [`fit`]
    ///
    /// # Errors
    /// See [`fit`].
    pub fn fit(&self) -> Result<CalibrationResult<E>> {
        fit(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SetSummary<E> {
    pub num_points: usize,
    pub mean_concentration: E,
    pub mean_response: E,
    pub min_concentration: E,
    pub max_concentration: E,
}

/// The fitted calibration line and the statistics derived from it
///
/// A result is a snapshot of the [`CalibrationSet`] it was computed from. It is never updated:
/// when the standards change a new result is fitted.
#[derive(Clone, Debug, Serialize)]
pub struct CalibrationResult<E> {
    slope: E,
    intercept: E,
    r_squared: E,
    correlation: E,
    p_value: E,
    residual_std_dev: E,
    lod: E,
    loq: E,
    predicted: Array1<E>,
    residuals: Array1<E>,
    slope_std_err: E,
    intercept_std_err: E,
    slope_ci95: E,
    intercept_ci95: E,
    // Sums retained for inverse prediction
    num_points: usize,
    mean_concentration: E,
    mean_response: E,
    sxx: E,
    syy: E,
}

impl<E: Real> CalibrationResult<E> {
    pub const fn slope(&self) -> E {
        self.slope
    }

    pub const fn intercept(&self) -> E {
        self.intercept
    }

    pub const fn r_squared(&self) -> E {
        self.r_squared
    }

    /// Pearson correlation coefficient $r$
    pub const fn correlation(&self) -> E {
        self.correlation
    }

    /// Two-sided p-value for the null hypothesis of zero slope
    pub const fn p_value(&self) -> E {
        self.p_value
    }

    pub const fn residual_std_dev(&self) -> E {
        self.residual_std_dev
    }

    /// Limit of detection, $3.3 s_{res} / |m|$
    pub const fn lod(&self) -> E {
        self.lod
    }

    /// Limit of quantification, $10 s_{res} / |m|$
    pub const fn loq(&self) -> E {
        self.loq
    }

    pub fn predicted(&self) -> ArrayView1<'_, E> {
        self.predicted.view()
    }

    pub fn residuals(&self) -> ArrayView1<'_, E> {
        self.residuals.view()
    }

    pub const fn slope_std_err(&self) -> E {
        self.slope_std_err
    }

    pub const fn intercept_std_err(&self) -> E {
        self.intercept_std_err
    }

    /// Half-width of the 95% confidence interval on the slope
    pub const fn slope_ci95(&self) -> E {
        self.slope_ci95
    }

    /// Half-width of the 95% confidence interval on the intercept
    pub const fn intercept_ci95(&self) -> E {
        self.intercept_ci95
    }

    pub const fn num_points(&self) -> usize {
        self.num_points
    }

    pub const fn mean_concentration(&self) -> E {
        self.mean_concentration
    }

    pub const fn mean_response(&self) -> E {
        self.mean_response
    }

    /// $S_{xx}$ of the standards
    pub const fn sxx(&self) -> E {
        self.sxx
    }

    /// Total sum of squares of the responses, $S_{yy}$
    pub const fn total_sum_of_squares(&self) -> E {
        self.syy
    }

    pub fn residual_sum_of_squares(&self) -> E {
        self.residuals.mapv(|residual| residual.powi(2)).sum()
    }

    /// A zero slope cannot be inverted, so detection limits and predictions fall back to zero
    pub fn is_degenerate(&self) -> bool {
        self.slope.is_zero()
    }

    pub fn equation(&self) -> String {
        format!("y = {:.4}x + {:.4}", self.slope, self.intercept)
    }

    /// Response predicted by the line at `concentration`
    pub fn evaluate(&self, concentration: E) -> E {
        self.intercept + self.slope * concentration
    }
}

/// Ordinary least squares fit of response against concentration
///
/// The slope and intercept minimise the sum of squared vertical residuals
///
/// $$
///     m = \frac{S_{xy}}{S_{xx}}, \quad b = \bar{y} - m \bar{x}
/// $$
///
/// The residual standard deviation carries $n - 2$ degrees of freedom and is zero for a two
/// point line, as are the confidence half-widths.
///
/// # Errors
/// - [`Error::InsufficientData`] for fewer than two standards
/// - [`Error::ConstantConcentration`] if every standard has the same concentration
pub fn fit<E: Real>(set: &CalibrationSet<E>) -> Result<CalibrationResult<E>> {
    let num_points = set.len();
    if num_points < 2 {
        return Err(Error::InsufficientData { found: num_points });
    }

    let x = set.concentration();
    let y = set.response();
    let insufficient = || Error::InsufficientData { found: num_points };
    let mean_concentration = math::mean(&x).ok_or_else(insufficient)?;
    let mean_response = math::mean(&y).ok_or_else(insufficient)?;

    let sxx = math::sum_of_squares(&x, mean_concentration);
    if sxx <= E::zero() {
        return Err(Error::ConstantConcentration);
    }
    let sxy = math::sum_of_cross_deviations(&x, mean_concentration, &y, mean_response);
    let syy = math::sum_of_squares(&y, mean_response);

    let slope = sxy / sxx;
    let intercept = mean_response - slope * mean_concentration;

    let correlation = if syy > E::zero() {
        (sxy / (sxx * syy).sqrt()).max(-E::one()).min(E::one())
    } else {
        E::zero()
    };
    let r_squared = correlation.powi(2);

    let predicted = &x * slope + intercept;
    let residuals = &y - &predicted;

    let degrees_of_freedom = num_points - 2;
    let residual_std_dev = if num_points > 2 {
        let ss_res = residuals.mapv(|residual| residual.powi(2)).sum();
        (ss_res / from_usize::<E>(degrees_of_freedom)).sqrt()
    } else {
        E::zero()
    };

    let (lod, loq) = if slope.is_zero() {
        warn!("calibration slope is zero, detection limits are undefined");
        (E::zero(), E::zero())
    } else {
        (
            from_f64::<E>(LOD_FACTOR) * residual_std_dev / slope.abs(),
            from_f64::<E>(LOQ_FACTOR) * residual_std_dev / slope.abs(),
        )
    };

    let slope_std_err = residual_std_dev / sxx.sqrt();
    let intercept_std_err = residual_std_dev
        * (E::one() / from_usize::<E>(num_points) + mean_concentration.powi(2) / sxx).sqrt();

    let t_value: E = from_f64(math::t_critical(0.975, degrees_of_freedom)?);
    let p_value = slope_p_value(correlation, &y, degrees_of_freedom)?;

    debug!(
        num_points,
        slope = %slope,
        intercept = %intercept,
        r_squared = %r_squared,
        "fitted calibration line"
    );

    Ok(CalibrationResult {
        slope,
        intercept,
        r_squared,
        correlation,
        p_value,
        residual_std_dev,
        lod,
        loq,
        predicted,
        residuals,
        slope_std_err,
        intercept_std_err,
        slope_ci95: t_value * slope_std_err,
        intercept_ci95: t_value * intercept_std_err,
        num_points,
        mean_concentration,
        mean_response,
        sxx,
        syy,
    })
}

// A line through two points fits exactly, so there is no distribution to test against: the
// slope is either exactly zero or certainly not.
fn slope_p_value<E: Real>(
    correlation: E,
    response: &ArrayView1<E>,
    degrees_of_freedom: usize,
) -> Result<E> {
    if degrees_of_freedom == 0 {
        return Ok(if response[0] == response[1] {
            E::one()
        } else {
            E::zero()
        });
    }
    let r: f64 = correlation.into();
    #[allow(clippy::cast_precision_loss)]
    let statistic = r * (degrees_of_freedom as f64 / ((1.0 - r) * (1.0 + r))).sqrt();
    Ok(from_f64(math::two_sided_p_value(statistic, degrees_of_freedom)?))
}
