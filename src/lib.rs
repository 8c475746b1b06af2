#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

pub mod calibration;
pub mod config;
pub mod math;
pub mod prediction;
pub mod report;
pub mod risk;
pub mod table;
pub mod validation;

pub use calibration::{fit, CalibrationPoint, CalibrationResult, CalibrationSet};
pub use config::Config;
pub use math::Real;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fewer than two standards, so no line can be defined
    #[error("calibration unavailable: need at least 2 points, found {found}")]
    InsufficientData { found: usize },

    #[error("calibration unavailable: all concentrations are identical")]
    ConstantConcentration,

    #[error("concentration and response columns differ in length ({concentration} vs {response})")]
    LengthMismatch { concentration: usize, response: usize },

    #[error("column `{0}` not found in table header")]
    MissingColumn(String),

    #[error("table has no header row")]
    EmptyTable,

    #[error("confidence level must lie strictly between 0 and 100, got {0}")]
    InvalidConfidenceLevel(f64),

    #[error("probability must lie strictly between 0 and 1, got {0}")]
    InvalidProbability(f64),

    #[error("delimiter `{0}` is not a single byte character")]
    InvalidDelimiter(char),

    #[error("distribution error: {0}")]
    Distribution(#[from] statrs::StatsError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
