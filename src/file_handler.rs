use crate::RelayError;
use itertools::Itertools;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Ensure `path` is a directory, creating it and its parents if needed.
/// Safe to call any number of times.
pub fn prepare(path: &Path) -> Result<(), RelayError> {
    if path.exists() && !path.is_dir() {
        return Err(RelayError::invalid_path(path, "exists and is not a directory"));
    }
    fs::create_dir_all(path).map_err(RelayError::Io)?;
    debug!(path = %path.display(), "folder ready");
    Ok(())
}

/// Delete a directory tree if it is there.
pub fn remove_if_exists(path: &Path) -> Result<(), RelayError> {
    if !path.exists() {
        return Ok(());
    }
    if !path.is_dir() {
        return Err(RelayError::invalid_path(path, "expected a directory to remove"));
    }
    fs::remove_dir_all(path).map_err(RelayError::Io)?;
    debug!(path = %path.display(), "folder removed");
    Ok(())
}

/// Names of the regular files directly inside `dir`, sorted.
/// Entries whose names are not valid UTF-8 are skipped with a warning.
pub fn list_file_names(dir: &Path) -> Result<Vec<String>, RelayError> {
    if !dir.is_dir() {
        return Err(RelayError::invalid_path(dir, "not a directory"));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(RelayError::Io)? {
        let entry = entry.map_err(RelayError::Io)?;
        // Follow symlinks: a linked scan is still a scan.
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => {
                warn!(name = ?raw, dir = %dir.display(), "skipping file with non UTF-8 name")
            }
        }
    }

    Ok(names.into_iter().sorted().collect())
}

/// Same directory ignoring trailing separators and `.` components; uses the
/// canonical form when both paths exist.
pub fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.components().eq(b.components()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_path = temp_dir.path().join("nested").join("work");

        assert!(!test_path.exists());
        prepare(&test_path).unwrap();
        assert!(test_path.is_dir());

        fs::write(test_path.join("keep.nii.gz"), b"x").unwrap();
        prepare(&test_path).unwrap();
        assert!(test_path.is_dir());
        assert!(test_path.join("keep.nii.gz").exists());
    }

    #[test]
    fn test_prepare_rejects_regular_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("not_a_dir");
        fs::write(&file_path, b"x").unwrap();

        let err = prepare(&file_path).unwrap_err();
        assert!(matches!(err, RelayError::InvalidPath { .. }));
    }

    #[test]
    fn test_remove_if_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let work = temp_dir.path().join("work");
        fs::create_dir_all(work.join("inner")).unwrap();
        fs::write(work.join("inner").join("a.nii.gz"), b"x").unwrap();

        remove_if_exists(&work).unwrap();
        assert!(!work.exists());

        // Missing directory is not an error
        remove_if_exists(&work).unwrap();
    }

    #[test]
    fn test_list_file_names_sorted_and_files_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("b.nii.gz"), b"x").unwrap();
        fs::write(temp_dir.path().join("a.nii.gz"), b"x").unwrap();
        fs::create_dir_all(temp_dir.path().join("c.nii.gz")).unwrap();

        let names = list_file_names(temp_dir.path()).unwrap();
        assert_eq!(names, vec!["a.nii.gz".to_string(), "b.nii.gz".to_string()]);
    }

    #[test]
    fn test_same_location() {
        let temp_dir = tempfile::tempdir().unwrap();
        let a = temp_dir.path().join("x");
        fs::create_dir_all(&a).unwrap();
        assert!(same_location(&a, &temp_dir.path().join("x").join(".")));
        assert!(!same_location(&a, temp_dir.path()));
    }
}
