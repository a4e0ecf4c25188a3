//! Centroid snapshot files and the per-round output area.
//!
//! Snapshots are always replaced atomically (temp file + rename in the same
//! directory), so a failed write leaves the previous snapshot intact.

use crate::error::{KmeansError, Result};
use kmeans_core::{load_centroids, write_centroids, Centroid, CentroidSet};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const PART_PREFIX: &str = "part-r-";

/// File name written by reducer `reducer` inside a round's output directory.
pub fn part_file_name(reducer: usize) -> String {
    format!("{PART_PREFIX}{reducer:05}")
}

/// Where sampled initial centroids are written when bootstrapping.
pub fn bootstrap_snapshot_path(work_dir: &Path) -> PathBuf {
    work_dir.join("initial_means").join("random_centroids.txt")
}

/// Orchestrator-owned snapshot path derived from the initial centroid file:
/// `<dir>/<stem>_final.<ext>`. Never equal to `initial`.
pub fn final_snapshot_path(initial: &Path) -> PathBuf {
    let stem = initial
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("centroids");
    let name = match initial.extension().and_then(OsStr::to_str) {
        Some(ext) => format!("{stem}_final.{ext}"),
        None => format!("{stem}_final"),
    };
    initial.with_file_name(name)
}

/// Atomically writes `centroids` to `path`, creating parent directories.
pub fn write_snapshot<'a>(
    path: &Path,
    centroids: impl IntoIterator<Item = &'a Centroid>,
) -> Result<()> {
    replace_atomically(path, |writer| write_centroids(writer, centroids))?;
    debug!(path = %path.display(), "wrote centroid snapshot");
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<CentroidSet> {
    Ok(load_centroids(path)?)
}

/// Writes one reducer's centroid records into the round output directory.
pub fn write_part_file<'a>(
    output: &Path,
    reducer: usize,
    centroids: impl IntoIterator<Item = &'a Centroid>,
) -> Result<PathBuf> {
    fs::create_dir_all(output).map_err(|source| KmeansError::io(output, source))?;
    let path = output.join(part_file_name(reducer));
    let file = File::create(&path).map_err(|source| KmeansError::io(&path, source))?;
    write_centroids(BufWriter::new(file), centroids)
        .map_err(|source| KmeansError::io(&path, source))?;
    Ok(path)
}

/// Lists the `part-r-*` files of a round output directory in name order.
pub fn list_part_files(output: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(output).map_err(|source| KmeansError::io(output, source))?;
    let mut parts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| KmeansError::io(output, source))?;
        let is_part = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(PART_PREFIX));
        if is_part {
            parts.push(entry.path());
        }
    }
    parts.sort();
    Ok(parts)
}

/// Concatenates every part file of `output` into the snapshot at `target`
/// and returns the parsed snapshot.
pub fn assemble_snapshot(output: &Path, target: &Path) -> Result<CentroidSet> {
    let parts = list_part_files(output)?;
    replace_atomically(target, |writer| {
        for part in &parts {
            let mut reader = BufReader::new(File::open(part)?);
            io::copy(&mut reader, writer)?;
        }
        writer.flush()
    })?;
    debug!(
        target = %target.display(),
        parts = parts.len(),
        "assembled centroid snapshot"
    );
    read_snapshot(target)
}

/// Removes a round output directory if present.
pub fn clear_output(output: &Path) -> Result<()> {
    match fs::remove_dir_all(output) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(KmeansError::io(output, source)),
    }
}

fn replace_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|source| KmeansError::io(&dir, source))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| KmeansError::io(&dir, source))?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        write(&mut writer).map_err(|source| KmeansError::io(path, source))?;
    }
    tmp.persist(path)
        .map_err(|err| KmeansError::io(path, err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(u32, &[f64])]) -> CentroidSet {
        CentroidSet::new(
            entries
                .iter()
                .map(|(id, coords)| Centroid::new(*id, coords.to_vec()).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn final_path_never_equals_initial() {
        assert_eq!(
            final_snapshot_path(Path::new("means/initial.txt")),
            PathBuf::from("means/initial_final.txt")
        );
        assert_eq!(
            final_snapshot_path(Path::new("seeds")),
            PathBuf::from("seeds_final")
        );
        let already = Path::new("x_final.txt");
        assert_ne!(final_snapshot_path(already), already);
    }

    #[test]
    fn part_files_are_zero_padded() {
        assert_eq!(part_file_name(0), "part-r-00000");
        assert_eq!(part_file_name(12), "part-r-00012");
    }

    #[test]
    fn write_snapshot_creates_parents_and_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = bootstrap_snapshot_path(dir.path());

        write_snapshot(&path, &set(&[(1, &[0.0]), (2, &[1.0])])).unwrap();
        write_snapshot(&path, &set(&[(1, &[5.0])])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "1\t5\n");
    }

    #[test]
    fn assemble_concatenates_parts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let first = set(&[(1, &[0.0, 0.5]), (3, &[1.0, 1.0])]);
        let second = set(&[(2, &[10.0, 0.5])]);
        write_part_file(&output, 1, &second).unwrap();
        write_part_file(&output, 0, &first).unwrap();
        fs::write(output.join("_SUCCESS"), "").unwrap();

        let target = dir.path().join("centroids_final.txt");
        let assembled = assemble_snapshot(&output, &target).unwrap();

        assert_eq!(assembled.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "1\t0\t0.5\n3\t1\t1\n2\t10\t0.5\n"
        );
    }

    #[test]
    fn failed_assembly_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("snap.txt");
        write_snapshot(&target, &set(&[(1, &[2.0])])).unwrap();

        let missing = dir.path().join("no-such-output");
        assert!(matches!(
            assemble_snapshot(&missing, &target),
            Err(KmeansError::Io { .. })
        ));
        assert_eq!(fs::read_to_string(&target).unwrap(), "1\t2\n");
    }

    #[test]
    fn clear_output_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        write_part_file(&output, 0, &set(&[(1, &[0.0])])).unwrap();
        clear_output(&output).unwrap();
        assert!(!output.exists());
        clear_output(&output).unwrap();
    }
}
