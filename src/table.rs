use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::calibration::{CalibrationPoint, CalibrationSet};
use crate::config::Config;
use crate::math::Real;
use crate::{Error, Result};

/// A line of input that held no usable number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRow {
    /// One-based line number in the source text
    pub line: u64,
    pub reason: String,
}

/// Calibration standards read from a delimited table
#[derive(Clone, Debug)]
pub struct CalibrationTable<E> {
    pub headers: Vec<String>,
    pub x_column: String,
    pub y_column: String,
    pub set: CalibrationSet<E>,
    pub skipped: Vec<SkippedRow>,
}

/// Read calibration standards from a table with a header row
///
/// The concentration and response columns are chosen by header name from `config`, defaulting to
/// the first and second columns. Rows where either chosen cell is not a finite number are left
/// out of the set and reported in [`CalibrationTable::skipped`].
///
/// # Errors
/// Returns an error if the header is missing, a configured column does not exist, or the input
/// is not readable as delimited text.
pub fn read_calibration_table<E: Real, R: Read>(
    reader: R,
    config: &Config,
) -> Result<CalibrationTable<E>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(config.delimiter_byte()?)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .map(|header| String::from_utf8_lossy(header).into_owned())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(Error::EmptyTable);
    }
    let x_index = select_column(&headers, config.x_column.as_deref(), 0)?;
    let y_index = select_column(&headers, config.y_column.as_deref(), 1)?;

    let mut points = vec![];
    let mut skipped = vec![];
    // Only the selected cells are decoded, so text in other columns may use any encoding
    for result in rdr.byte_records() {
        let record = result?;
        let line = record.position().map_or(0, csv::Position::line);
        match (
            parse_byte_cell::<E>(record.get(x_index)),
            parse_byte_cell::<E>(record.get(y_index)),
        ) {
            (Ok(concentration), Ok(response)) => {
                points.push(CalibrationPoint::new(concentration, response));
            }
            (Err(reason), _) | (_, Err(reason)) => {
                warn!(line, %reason, "skipping calibration row");
                skipped.push(SkippedRow { line, reason });
            }
        }
    }

    debug!(
        num_points = points.len(),
        num_skipped = skipped.len(),
        "read calibration table"
    );

    Ok(CalibrationTable {
        x_column: headers[x_index].clone(),
        y_column: headers[y_index].clone(),
        headers,
        set: CalibrationSet::from_points(points),
        skipped,
    })
}

/// # Errors
/// See [`read_calibration_table`].
pub fn parse_calibration_text<E: Real>(text: &str, config: &Config) -> Result<CalibrationTable<E>> {
    read_calibration_table(text.as_bytes(), config)
}

/// # Errors
/// Returns an error if the file cannot be opened, or see [`read_calibration_table`].
pub fn read_calibration_file<E: Real>(path: &Path, config: &Config) -> Result<CalibrationTable<E>> {
    let file = File::open(path)?;
    read_calibration_table(file, config)
}

// Named columns must exist; otherwise fall back to `default_index`, or the last column when the
// table is narrower than that.
fn select_column(headers: &[String], name: Option<&str>, default_index: usize) -> Result<usize> {
    match name {
        Some(name) => headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| Error::MissingColumn(name.to_owned())),
        None => Ok(default_index.min(headers.len() - 1)),
    }
}

fn parse_cell<E: Real>(cell: Option<&str>) -> ::std::result::Result<E, String> {
    let cell = cell.ok_or_else(|| "row is missing a column".to_owned())?;
    match cell.parse::<E>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("`{cell}` is not a finite number")),
    }
}

fn parse_byte_cell<E: Real>(cell: Option<&[u8]>) -> ::std::result::Result<E, String> {
    let Some(bytes) = cell else {
        return parse_cell(None);
    };
    let cell = std::str::from_utf8(bytes)
        .map_err(|_| format!("`{}` is not valid UTF-8", String::from_utf8_lossy(bytes)))?;
    parse_cell(Some(cell))
}

/// Sample responses entered one per line
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedResponses<E> {
    pub values: Vec<E>,
    pub skipped: Vec<SkippedRow>,
}

/// Parse one response per line, ignoring blank lines
///
/// Lines that are not finite numbers are reported in [`ParsedResponses::skipped`].
pub fn parse_responses<E: Real>(text: &str) -> ParsedResponses<E> {
    let mut values = vec![];
    let mut skipped = vec![];
    for (ii, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_cell::<E>(Some(trimmed)) {
            Ok(value) => values.push(value),
            Err(reason) => {
                let line = ii as u64 + 1;
                warn!(line, %reason, "skipping sample response");
                skipped.push(SkippedRow { line, reason });
            }
        }
    }
    ParsedResponses { values, skipped }
}

/// Read sample responses from a file
///
/// Files with a `csv` extension are read as a table with a header row, taking the first column.
/// Any other file holds one response per line.
///
/// # Errors
/// Returns an error if the file cannot be read or a `csv` file is malformed.
pub fn read_responses_file<E: Real>(path: &Path) -> Result<ParsedResponses<E>> {
    if path.extension().map_or(false, |ext| ext == "csv") {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut values = vec![];
        let mut skipped = vec![];
        for result in rdr.byte_records() {
            let record = result?;
            let line = record.position().map_or(0, csv::Position::line);
            match parse_byte_cell::<E>(record.get(0)) {
                Ok(value) => values.push(value),
                Err(reason) => {
                    warn!(line, %reason, "skipping sample response");
                    skipped.push(SkippedRow { line, reason });
                }
            }
        }
        Ok(ParsedResponses { values, skipped })
    } else {
        let bytes = fs::read(path)?;
        Ok(parse_responses(&String::from_utf8_lossy(&bytes)))
    }
}

#[cfg(test)]
mod test {
    use tempdir::TempDir;

    use super::{
        parse_calibration_text, parse_responses, read_calibration_table, read_responses_file,
        SkippedRow,
    };
    use crate::config::Config;
    use crate::Error;

    const DEFAULT_DATA: &str = "Concentration,Response
0,0.01
0.5,0.15
1.0,0.32
2.0,0.61
5.0,1.52
10.0,3.01";

    #[test]
    fn default_columns_are_first_and_second() {
        let table = parse_calibration_text::<f64>(DEFAULT_DATA, &Config::default()).unwrap();
        assert_eq!(table.x_column, "Concentration");
        assert_eq!(table.y_column, "Response");
        assert_eq!(table.set.len(), 6);
        assert!(table.skipped.is_empty());

        let last = table.set.points().last().unwrap();
        assert_eq!(last.concentration, 10.0);
        assert_eq!(last.response, 3.01);
    }

    #[test]
    fn columns_are_selected_by_header() {
        let text = "Sample,Absorbance,Standard\nA,0.10,1\nB,0.21,2\nC,0.29,3\n";
        let config = Config {
            x_column: Some("Standard".to_owned()),
            y_column: Some("Absorbance".to_owned()),
            ..Config::default()
        };
        let table = parse_calibration_text::<f64>(text, &config).unwrap();
        let points = table.set.points().collect::<Vec<_>>();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1].concentration, 2.0);
        assert_eq!(points[1].response, 0.21);
    }

    #[test]
    fn unknown_columns_are_an_error() {
        let config = Config {
            y_column: Some("Fluorescence".to_owned()),
            ..Config::default()
        };
        assert!(matches!(
            parse_calibration_text::<f64>(DEFAULT_DATA, &config),
            Err(Error::MissingColumn(name)) if name == "Fluorescence"
        ));
    }

    #[test]
    fn single_column_tables_use_it_for_both_axes() {
        let table = parse_calibration_text::<f64>("Value\n1\n2\n", &Config::default()).unwrap();
        assert_eq!(table.x_column, "Value");
        assert_eq!(table.y_column, "Value");
        assert_eq!(table.set.len(), 2);
    }

    #[test]
    fn malformed_rows_are_reported_not_dropped_silently() {
        let text = "x,y\n0,0.01\nabc,0.2\n1,\n2,0.61\n3,NaN\n";
        let table = parse_calibration_text::<f64>(text, &Config::default()).unwrap();

        assert_eq!(table.set.len(), 2);
        let lines = table
            .skipped
            .iter()
            .map(|row| row.line)
            .collect::<Vec<_>>();
        assert_eq!(lines, vec![3, 4, 6]);
        assert!(table.skipped[0].reason.contains("abc"));
    }

    #[test]
    fn undecodable_bytes_only_matter_in_selected_columns() {
        let data: &[u8] = b"Concentration,Response,Label\n0,0.01,blank\n1,0.32,Ag 1 \xb5g\n\xff\xfe,0.45,Ag 1.5\n2,0.61,Ag 2\n";
        let table = read_calibration_table::<f64, _>(data, &Config::default()).unwrap();

        assert_eq!(table.set.len(), 3);
        assert_eq!(table.skipped.len(), 1);
        assert_eq!(table.skipped[0].line, 4);
        assert!(table.skipped[0].reason.contains("UTF-8"));
    }

    #[test]
    fn alternative_delimiters_are_honoured() {
        let config = Config {
            delimiter: ';',
            ..Config::default()
        };
        let table = parse_calibration_text::<f64>("x;y\n1;2\n3;4\n", &config).unwrap();
        assert_eq!(table.set.len(), 2);
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            parse_calibration_text::<f64>("", &Config::default()),
            Err(Error::EmptyTable)
        ));
    }

    #[test]
    fn responses_skip_blank_and_malformed_lines() {
        let parsed = parse_responses::<f64>("0.45\n\n0.48\n  0.47  \nn/a\n1.25\n");
        assert_eq!(parsed.values, vec![0.45, 0.48, 0.47, 1.25]);
        assert_eq!(
            parsed.skipped,
            vec![SkippedRow {
                line: 5,
                reason: "`n/a` is not a finite number".to_owned()
            }]
        );
    }

    #[test]
    fn responses_are_read_from_csv_and_text_files() {
        let tmp_dir = TempDir::new("responses_are_read_from_csv_and_text_files").unwrap();

        let csv_path = tmp_dir.path().join("samples.csv");
        std::fs::write(&csv_path, "Response,Sample\n0.45,A\n0.48,B\n").unwrap();
        let parsed = read_responses_file::<f64>(&csv_path).unwrap();
        assert_eq!(parsed.values, vec![0.45, 0.48]);

        let txt_path = tmp_dir.path().join("samples.txt");
        std::fs::write(&txt_path, b"1.25\n\xb5\n1.23\n").unwrap();
        let parsed = read_responses_file::<f64>(&txt_path).unwrap();
        assert_eq!(parsed.values, vec![1.25, 1.23]);
        assert_eq!(parsed.skipped.len(), 1);
    }

    #[test]
    fn csv_responses_skip_undecodable_cells() {
        let tmp_dir = TempDir::new("csv_responses_skip_undecodable_cells").unwrap();

        let csv_path = tmp_dir.path().join("samples.csv");
        std::fs::write(&csv_path, b"Response,Sample\n0.45,\xb5A\n\xff,B\n0.48,C\n").unwrap();
        let parsed = read_responses_file::<f64>(&csv_path).unwrap();
        assert_eq!(parsed.values, vec![0.45, 0.48]);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 3);
    }
}
