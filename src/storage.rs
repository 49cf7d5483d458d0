//! Durable file storage for datasets and small state files.
//!
//! Every write goes to a temporary file in the destination directory, is
//! fsynced, and is then renamed over the target, so a crash leaves either the
//! previous file or the new one, never a torn mix.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, ResultExt};
use crate::models::{DatasetMetadata, Lead, LeadDataset, OutputDataset};

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer
            .flush()
            .with_context(|| format!("writing {}", path.display()))?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("syncing {}", path.display()))?;
    tmp.persist(path).map_err(|e| PipelineError::WithContext {
        source: Box::new(PipelineError::from(e.error)),
        context: format!("replacing {}", path.display()),
    })?;

    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PipelineError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PipelineError::from(e)).with_context(|| format!("reading {}", path.display()))
        }
    };
    let parsed = serde_json::from_str(&content).map_err(|e| {
        PipelineError::InvalidInput(format!("{}: {}", path.display(), e))
    })?;
    Ok(Some(parsed))
}

/// Delete a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<(), PipelineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::from(e)).with_context(|| format!("removing {}", path.display())),
    }
}

/// Load the candidate dataset. A missing file is a setup failure.
pub fn load_input(path: &Path) -> Result<Vec<Lead>, PipelineError> {
    match read_json::<LeadDataset>(path) {
        Ok(Some(dataset)) => Ok(dataset.into_leads()),
        Ok(None) => Err(PipelineError::InputNotFound(path.to_path_buf())),
        Err(PipelineError::WithContext { source, context }) => Err(PipelineError::Setup(format!(
            "{}: {}",
            context, source
        ))),
        Err(e) => Err(e),
    }
}

/// Load a previously written output dataset for resume.
///
/// Unreadable or malformed output degrades to `None` with a warning; the
/// checkpoint alone then drives the resume.
pub fn load_prior_output(path: &Path) -> Option<Vec<Lead>> {
    match read_json::<LeadDataset>(path) {
        Ok(Some(dataset)) => Some(dataset.into_leads()),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Ignoring prior output {}: {}", path.display(), e);
            None
        }
    }
}

/// Writes the merged dataset, idempotently, to one path.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    path: PathBuf,
    run_id: uuid::Uuid,
}

impl OutputWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: uuid::Uuid::new_v4(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Write the full dataset with freshly computed metadata.
    pub fn write(&self, leads: &[Lead]) -> Result<DatasetMetadata, PipelineError> {
        let metadata = DatasetMetadata::from_leads(leads, self.run_id);
        let dataset = OutputDataset {
            metadata: metadata.clone(),
            leads: leads.to_vec(),
        };
        write_json_atomic(&self.path, &dataset)
            .with_context(|| format!("writing output dataset {}", self.path.display()))?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VerificationState, VerificationStatus};

    #[test]
    fn test_atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &serde_json::json!({"v": 1})).unwrap();
        write_json_atomic(&path, &serde_json::json!({"v": 2})).unwrap();

        let value: serde_json::Value = read_json(&path).unwrap().unwrap();
        assert_eq!(value["v"], 2);
        // Only the target remains; temp files were renamed away.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.json");
        write_json_atomic(&path, &serde_json::json!([])).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_missing_input_is_setup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_input(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_malformed_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_input(&path).unwrap_err();
        assert!(err.is_setup_failure());
    }

    #[test]
    fn test_output_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().join("out.json"));
        let mut lead = Lead {
            phone: Some("+525511112222".into()),
            ..Lead::default()
        };
        lead.apply_verification(VerificationState::new(VerificationStatus::Valid));

        let meta = writer.write(&[lead.clone(), Lead::default()]).unwrap();
        assert_eq!(meta.valid, 1);
        assert_eq!(meta.pending, 1);

        let prior = load_prior_output(writer.path()).unwrap();
        assert_eq!(prior[0], lead);
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_if_exists(&dir.path().join("gone.json")).unwrap();
    }
}
