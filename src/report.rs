use std::io::Write;

use serde::Serialize;

use crate::calibration::{CalibrationResult, CalibrationSet};
use crate::math::Real;
use crate::Result;

#[derive(Serialize)]
struct Row<E> {
    #[serde(rename = "Concentration (x)")]
    concentration: E,
    #[serde(rename = "Response (y)")]
    response: E,
    #[serde(rename = "Predicted y")]
    predicted: E,
    #[serde(rename = "Residual")]
    residual: E,
    #[serde(rename = "Residual²")]
    residual_squared: E,
}

/// Write the point-by-point calculation table as CSV
///
/// # Errors
/// Returns an error if writing to `writer` fails.
pub fn write_table<E: Real, W: Write>(
    set: &CalibrationSet<E>,
    calibration: &CalibrationResult<E>,
    writer: W,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for ((point, &predicted), &residual) in set
        .points()
        .zip(calibration.predicted().iter())
        .zip(calibration.residuals().iter())
    {
        wtr.serialize(Row {
            concentration: point.concentration,
            response: point.response,
            predicted,
            residual,
            residual_squared: residual.powi(2),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render a plain-text summary of the calibration
pub fn render_report<E: Real>(set: &CalibrationSet<E>, calibration: &CalibrationResult<E>) -> String {
    let mut report = format!(
        "CALIBRATION REPORT
========================
Equation: {equation}
R²: {r_squared:.6}
R: {correlation:.6}
p-value: {p_value:.6}

SLOPE: {slope:.6} ± {slope_std_err:.6}
95% CI: ±{slope_ci95:.6}

INTERCEPT: {intercept:.6} ± {intercept_std_err:.6}
95% CI: ±{intercept_ci95:.6}

LOD: {lod:.6}
LOQ: {loq:.6}
S_res: {residual_std_dev:.6}

Number of points: {num_points}
",
        equation = calibration.equation(),
        r_squared = calibration.r_squared(),
        correlation = calibration.correlation(),
        p_value = calibration.p_value(),
        slope = calibration.slope(),
        slope_std_err = calibration.slope_std_err(),
        slope_ci95 = calibration.slope_ci95(),
        intercept = calibration.intercept(),
        intercept_std_err = calibration.intercept_std_err(),
        intercept_ci95 = calibration.intercept_ci95(),
        lod = calibration.lod(),
        loq = calibration.loq(),
        residual_std_dev = calibration.residual_std_dev(),
        num_points = set.len(),
    );
    if let Some((min, max)) = set.concentration_range() {
        report.push_str(&format!("X range: {min:.6} - {max:.6}\n"));
    }
    report
}
