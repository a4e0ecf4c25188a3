//! Immutable data samples read from the input point set.

use crate::error::{CoreError, Result};
use crate::record::{parse_coordinates, FIELD_SEPARATOR};
use crate::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, Write};

/// One data sample. Coordinates are fixed once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    coords: Box<[f64]>,
}

impl Point {
    /// Builds a point, rejecting empty or non-finite coordinate vectors.
    pub fn new(coords: Vector) -> Result<Self> {
        if coords.is_empty() {
            return Err(CoreError::InvalidArgument(
                "a point needs at least one coordinate".to_string(),
            ));
        }
        if let Some(bad) = coords.iter().find(|value| !value.is_finite()) {
            return Err(CoreError::InvalidArgument(format!(
                "point coordinate {bad} is not finite"
            )));
        }
        Ok(Self {
            coords: coords.into_boxed_slice(),
        })
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn dimension(&self) -> usize {
        self.coords.len()
    }

    /// Parses a tab-separated point record. When `has_id_column` is set the
    /// leading field is an identifier and is skipped.
    pub fn parse(line: &str, has_id_column: bool) -> std::result::Result<Self, String> {
        let mut fields = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR);
        if has_id_column && fields.next().is_none() {
            return Err("missing id column".to_string());
        }
        let coords = parse_coordinates(fields)?;
        Ok(Self {
            coords: coords.into_boxed_slice(),
        })
    }
}

impl AsRef<[f64]> for Point {
    fn as_ref(&self) -> &[f64] {
        &self.coords
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.coords.iter().enumerate() {
            if i > 0 {
                write!(f, "{FIELD_SEPARATOR}")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Returns true for lines that carry no record.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Summary of a validated point source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointScan {
    /// Number of non-blank records
    pub records: usize,
    /// Shared dimensionality, `None` when the source holds no records
    pub dimension: Option<usize>,
}

/// Parses every non-blank record, handing each point to `visit`. All points
/// must share the dimensionality of the first one.
fn visit_points<R, F>(reader: R, has_id_column: bool, mut visit: F) -> Result<PointScan>
where
    R: BufRead,
    F: FnMut(Point),
{
    let mut scan = PointScan {
        records: 0,
        dimension: None,
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CoreError::io("<point reader>", source))?;
        if is_blank(&line) {
            continue;
        }
        let point = Point::parse(&line, has_id_column).map_err(|reason| {
            CoreError::MalformedRecord {
                line: index + 1,
                reason,
            }
        })?;

        match scan.dimension {
            None => scan.dimension = Some(point.dimension()),
            Some(expected) if expected != point.dimension() => {
                return Err(CoreError::MalformedRecord {
                    line: index + 1,
                    reason: format!(
                        "expected {expected} coordinates, found {}",
                        point.dimension()
                    ),
                });
            }
            Some(_) => {}
        }
        scan.records += 1;
        visit(point);
    }

    Ok(scan)
}

/// Reads every point record from `reader`, checking that all points share the
/// dimensionality of the first one. Blank lines are skipped.
pub fn read_points<R: BufRead>(reader: R, has_id_column: bool) -> Result<Vec<Point>> {
    let mut points = Vec::new();
    visit_points(reader, has_id_column, |point| points.push(point))?;
    Ok(points)
}

/// Validates every record of `reader` without keeping the points, returning
/// the record count and dimensionality.
pub fn scan_points<R: BufRead>(reader: R, has_id_column: bool) -> Result<PointScan> {
    visit_points(reader, has_id_column, |_| {})
}

/// Writes points as tab-separated records, one per line.
pub fn write_points<W: Write>(mut writer: W, points: &[Point]) -> std::io::Result<()> {
    for point in points {
        writeln!(writer, "{point}")?;
    }
    writer.flush()
}
