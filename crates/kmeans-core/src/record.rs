//! Centroid records and their tab-separated text form:
//! `<centroidId>\t<coord_1>\t...\t<coord_D>`.

use crate::error::{CoreError, Result};
use crate::point::is_blank;
use crate::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub const FIELD_SEPARATOR: char = '\t';

/// Positive identifier of a centroid, unique within a run.
pub type CentroidId = u32;

pub(crate) fn parse_coordinates<'a>(
    fields: impl Iterator<Item = &'a str>,
) -> std::result::Result<Vector, String> {
    let mut coords = Vec::new();
    for field in fields {
        let field = field.trim();
        let value: f64 = field
            .parse()
            .map_err(|_| format!("'{field}' is not a number"))?;
        if !value.is_finite() {
            return Err(format!("'{field}' is not a finite number"));
        }
        coords.push(value);
    }
    if coords.is_empty() {
        return Err("record has no coordinates".to_string());
    }
    Ok(coords)
}

/// Snapshot of one centroid: its id and coordinates at a round boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub id: CentroidId,
    pub coords: Vector,
}

impl Centroid {
    pub fn new(id: CentroidId, coords: Vector) -> Result<Self> {
        if id == 0 {
            return Err(CoreError::InvalidArgument(
                "centroid ids must be positive".to_string(),
            ));
        }
        if coords.is_empty() {
            return Err(CoreError::InvalidArgument(format!(
                "centroid {id} has no coordinates"
            )));
        }
        Ok(Self { id, coords })
    }

    pub fn dimension(&self) -> usize {
        self.coords.len()
    }

    /// Parses a single centroid record.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut fields = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR);
        let id_field = fields.next().unwrap_or_default().trim();
        let id: CentroidId = id_field
            .parse()
            .map_err(|_| format!("'{id_field}' is not a centroid id"))?;
        if id == 0 {
            return Err("centroid ids must be positive".to_string());
        }
        let coords = parse_coordinates(fields)?;
        Ok(Self { id, coords })
    }
}

impl fmt::Display for Centroid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        for value in &self.coords {
            write!(f, "{FIELD_SEPARATOR}{value}")?;
        }
        Ok(())
    }
}

/// A complete, validated centroid snapshot: non-empty, ids unique and sorted,
/// every centroid of the same dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidSet {
    centroids: Vec<Centroid>,
    dimension: usize,
}

impl CentroidSet {
    pub fn new(mut centroids: Vec<Centroid>) -> Result<Self> {
        let dimension = match centroids.first() {
            Some(first) => first.dimension(),
            None => {
                return Err(CoreError::InvalidArgument(
                    "centroid set is empty".to_string(),
                ))
            }
        };

        centroids.sort_by_key(|centroid| centroid.id);
        for pair in centroids.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(CoreError::InvalidArgument(format!(
                    "duplicate centroid id {}",
                    pair[0].id
                )));
            }
        }
        if let Some(bad) = centroids.iter().find(|c| c.dimension() != dimension) {
            return Err(CoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.dimension(),
            });
        }

        Ok(Self {
            centroids,
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn get(&self, id: CentroidId) -> Option<&Centroid> {
        self.centroids
            .binary_search_by_key(&id, |centroid| centroid.id)
            .ok()
            .map(|index| &self.centroids[index])
    }

    pub fn ids(&self) -> impl Iterator<Item = CentroidId> + '_ {
        self.centroids.iter().map(|centroid| centroid.id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Centroid> {
        self.centroids.iter()
    }

    pub fn as_slice(&self) -> &[Centroid] {
        &self.centroids
    }

    pub fn into_vec(self) -> Vec<Centroid> {
        self.centroids
    }
}

impl<'a> IntoIterator for &'a CentroidSet {
    type Item = &'a Centroid;
    type IntoIter = std::slice::Iter<'a, Centroid>;

    fn into_iter(self) -> Self::IntoIter {
        self.centroids.iter()
    }
}

/// Reads centroid records from `reader`, skipping blank lines.
pub fn read_centroids<R: BufRead>(reader: R) -> Result<CentroidSet> {
    let mut centroids = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CoreError::io("<centroid reader>", source))?;
        if is_blank(&line) {
            continue;
        }
        let centroid = Centroid::parse(&line).map_err(|reason| CoreError::MalformedRecord {
            line: index + 1,
            reason,
        })?;
        centroids.push(centroid);
    }
    CentroidSet::new(centroids)
}

/// Writes centroid records, one per line.
pub fn write_centroids<'a, W: Write>(
    mut writer: W,
    centroids: impl IntoIterator<Item = &'a Centroid>,
) -> std::io::Result<()> {
    for centroid in centroids {
        writeln!(writer, "{centroid}")?;
    }
    writer.flush()
}

/// Loads a centroid snapshot from a file.
pub fn load_centroids(path: impl AsRef<Path>) -> Result<CentroidSet> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CoreError::io(path, source))?;
    read_centroids(BufReader::new(file)).map_err(|err| match err {
        CoreError::Io { source, .. } => CoreError::io(path, source),
        other => other,
    })
}
