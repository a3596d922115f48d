//! Feature file reader

use std::fs;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;
use walkdir::WalkDir;

use super::{FeatureValue, Label, Sample};
use crate::error::{MalpacError, Result};

/// Read one feature file: one `name,value` row per feature, value kept in row order
pub fn read_feature_file(path: &Path) -> Result<Vec<FeatureValue>> {
    if !path.is_file() {
        return Err(MalpacError::MissingFile(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;

    // The csv reader drops empty records, but a blank row is still a malformed row
    if let Some(idx) = content.lines().position(|line| line.trim_end_matches('\r').is_empty()) {
        return Err(MalpacError::MalformedFeatureRow {
            path: path.to_path_buf(),
            line: idx as u64 + 1,
            fields: 0,
        });
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != 2 {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(MalpacError::MalformedFeatureRow {
                path: path.to_path_buf(),
                line,
                fields: record.len(),
            });
        }
        values.push(FeatureValue::parse(&record[1]));
    }

    Ok(values)
}

/// Read every feature file below `dir`, all of them labelled `label`
pub fn read_feature_dir(dir: &Path, label: Label) -> Result<Vec<Sample>> {
    if !dir.is_dir() {
        return Err(MalpacError::MissingFile(dir.to_path_buf()));
    }

    let mut samples = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let values = read_feature_file(entry.path())?;
        samples.push(Sample {
            name: entry.file_name().to_string_lossy().into_owned(),
            values,
            label,
        });
    }

    debug!(dir = %dir.display(), label = %label, samples = samples.len(), "Read feature directory");
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_feature_file_coerces_booleans_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.csv");
        fs::write(&path, "f1,true\nf2,false\nf3,1.5\n").unwrap();

        let values = read_feature_file(&path).unwrap();
        assert_eq!(
            values,
            vec![
                FeatureValue::Bool(true),
                FeatureValue::Bool(false),
                FeatureValue::Text("1.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_read_feature_file_malformed_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.csv");
        fs::write(&path, "f1,true\nf2\nf3,1.5\n").unwrap();

        let err = read_feature_file(&path).unwrap_err();
        match err {
            MalpacError::MalformedFeatureRow { line, fields, .. } => {
                assert_eq!(line, 2);
                assert_eq!(fields, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_feature_file_too_many_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.csv");
        fs::write(&path, "f1,true,extra\n").unwrap();

        assert!(matches!(
            read_feature_file(&path),
            Err(MalpacError::MalformedFeatureRow { fields: 3, .. })
        ));
    }

    #[test]
    fn test_read_feature_file_blank_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.csv");
        fs::write(&path, "f1,true\n\nf3,1.5\n").unwrap();

        match read_feature_file(&path).unwrap_err() {
            MalpacError::MalformedFeatureRow { line, fields, .. } => {
                assert_eq!(line, 2);
                assert_eq!(fields, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_feature_file_trailing_newline_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.csv");
        fs::write(&path, "f1,1\r\nf2,0\r\n").unwrap();

        assert_eq!(read_feature_file(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_feature_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_feature_file(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, MalpacError::MissingFile(_)));
    }

    #[test]
    fn test_read_feature_dir_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.csv"), "f1,1\nf2,true\n").unwrap();
        fs::write(dir.path().join("nested").join("b.csv"), "f1,2\nf2,false\n").unwrap();

        let samples = read_feature_dir(dir.path(), Label::Benign).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.label == Label::Benign));
        assert!(samples.iter().any(|s| s.name == "b.csv"));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_feature_dir_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let target = source.path().join("shared.csv");
        fs::write(&target, "f1,1\nf2,0\n").unwrap();
        fs::write(dir.path().join("a.csv"), "f1,0\nf2,1\n").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("b.csv")).unwrap();

        let samples = read_feature_dir(dir.path(), Label::Malicious).unwrap();
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
        assert_eq!(
            samples[1].values,
            vec![FeatureValue::Text("1".into()), FeatureValue::Text("0".into())]
        );
    }

    #[test]
    fn test_read_feature_dir_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_feature_dir(&dir.path().join("absent"), Label::Malicious).unwrap_err();
        assert!(matches!(err, MalpacError::MissingFile(_)));
    }
}
