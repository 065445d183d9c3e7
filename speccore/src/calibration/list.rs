use std::path::Path;

use tracing::warn;

use crate::calibration::polynomial::Calibration;
use crate::error::CalibrationError;

/// Parsed contents of a calibration list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalList {
    /// `(spectrum name, calibration)` in file order.
    pub entries: Vec<(String, Calibration)>,
    /// 1-based numbers of lines that could not be parsed.
    pub skipped: Vec<usize>,
}

fn parse_line(line: &str) -> Option<(String, Calibration)> {
    let (name, coefficients) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let coefficients = coefficients
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<f64>, _>>()
        .ok()?;
    Some((name.to_string(), Calibration::new(coefficients)))
}

/// Parses calibration list text, one `name: c0 c1 ...` per line.
///
/// Everything after `#` is a comment and blank lines are ignored. Lines
/// that do not parse are logged and skipped.
///
/// # Example
///
/// ```rust
/// # use speccore::calibration::list::parse_cal_list;
/// let list = parse_cal_list("# gamma run\nge1: 0.5 0.33\n");
/// assert_eq!(list.entries[0].0, "ge1");
/// ```
pub fn parse_cal_list(text: &str) -> CalList {
    let mut list = CalList::default();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(entry) => list.entries.push(entry),
            None => {
                warn!(line = index + 1, "could not parse calibration list line, ignored");
                list.skipped.push(index + 1);
            }
        }
    }
    list
}

pub fn read_cal_list(path: &Path) -> Result<CalList, CalibrationError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| CalibrationError::ListIo { path: path.to_path_buf(), source })?;
    Ok(parse_cal_list(&text))
}
