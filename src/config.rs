use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// User settings, read from a TOML file
///
/// Every field is optional in the file. Missing fields take the values of [`Config::default`].
///
/// ```toml
/// x_column = "Concentration"
/// y_column = "Absorbance"
/// delimiter = ";"
/// confidence_level = 99.0
/// linearity_threshold = 0.995
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Header of the concentration column, the first column when unset
    pub x_column: Option<String>,
    /// Header of the response column, the second column when unset
    pub y_column: Option<String>,
    pub delimiter: char,
    /// Confidence level for sample prediction intervals, in percent
    pub confidence_level: f64,
    /// Minimum $r^2$ for the method to be reported as linear
    pub linearity_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            x_column: None,
            y_column: None,
            delimiter: ',',
            confidence_level: 95.0,
            linearity_threshold: 0.99,
        }
    }
}

impl Config {
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid TOML for a `Config`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub(crate) fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(Error::InvalidDelimiter(self.delimiter))
        }
    }
}

#[cfg(test)]
mod test {
    use tempdir::TempDir;

    use super::Config;
    use crate::Error;

    #[test]
    fn missing_fields_take_default_values() {
        let config: Config = toml::from_str("y_column = \"Absorbance\"").unwrap();
        assert_eq!(config.y_column.as_deref(), Some("Absorbance"));
        assert_eq!(config.x_column, None);
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.confidence_level, 95.0);
        assert_eq!(config.linearity_threshold, 0.99);
    }

    #[test]
    fn config_is_read_from_file() {
        let tmp_dir = TempDir::new("config_is_read_from_file").unwrap();
        let path = tmp_dir.path().join("nanocalibrate.toml");
        let expected = Config {
            x_column: Some("Concentration".to_owned()),
            y_column: Some("Absorbance".to_owned()),
            delimiter: ';',
            confidence_level: 99.0,
            linearity_threshold: 0.995,
        };
        std::fs::write(&path, toml::to_string(&expected).unwrap()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config, expected);
        assert_eq!(config.delimiter_byte().unwrap(), b';');
    }

    #[test]
    fn non_ascii_delimiters_are_rejected() {
        let config = Config {
            delimiter: '→',
            ..Config::default()
        };
        assert!(matches!(
            config.delimiter_byte(),
            Err(Error::InvalidDelimiter('→'))
        ));
    }

    #[test]
    fn malformed_files_report_a_config_error() {
        let tmp_dir = TempDir::new("malformed_files_report_a_config_error").unwrap();
        let path = tmp_dir.path().join("nanocalibrate.toml");
        std::fs::write(&path, "confidence_level = \"high\"").unwrap();
        assert!(matches!(Config::from_file(&path), Err(Error::Config(_))));
    }
}
