use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DispatchError, Result, Stage};
use crate::network::NetworkModel;

const EXTENSION: &str = "json";

/// One persisted run: network definition, inputs and solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpArtifact {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub model: NetworkModel,
}

/// Directory of run artifacts, one `<run_id>.json` per run
#[derive(Debug, Clone)]
pub struct DumpRepository {
    dir: PathBuf,
}

impl DumpRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> Result<PathBuf> {
        validate_run_id(run_id)?;
        Ok(self.dir.join(format!("{run_id}.{EXTENSION}")))
    }

    /// Persist a solved model, overwriting an artifact with the same id.
    ///
    /// The model is only borrowed, so a failed write leaves the caller free
    /// to retry without solving again.
    pub fn save(&self, run_id: &str, model: &NetworkModel) -> Result<PathBuf> {
        let path = self.path_for(run_id)?;
        if model.results.is_none() {
            return Err(DispatchError::invariant(
                Stage::Persist,
                format!("run '{run_id}' has no results to persist"),
            ));
        }

        fs::create_dir_all(&self.dir).map_err(|e| DispatchError::io(Stage::Persist, &self.dir, e))?;

        let artifact = DumpArtifact {
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model: model.clone(),
        };

        // write next to the target and rename, so a failed write never
        // leaves a truncated `<run_id>.json` behind
        let temp_path = path.with_extension(format!("{EXTENSION}.tmp"));
        let written = fs::File::create(&temp_path).and_then(|file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &artifact).map_err(std::io::Error::from)?;
            writer.flush()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(DispatchError::io(Stage::Persist, &temp_path, e));
        }
        fs::rename(&temp_path, &path).map_err(|e| DispatchError::io(Stage::Persist, &path, e))?;

        info!(run_id, path = %path.display(), "dumped energy system and results");
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<DumpArtifact> {
        let path = self.path_for(run_id)?;
        let file = fs::File::open(&path).map_err(|e| DispatchError::io(Stage::Persist, &path, e))?;
        let artifact: DumpArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DispatchError::io(Stage::Persist, &path, e.into()))?;
        debug!(run_id, "restored energy system");
        Ok(artifact)
    }

    /// Run ids of all stored artifacts, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DispatchError::io(Stage::Persist, &self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DispatchError::io(Stage::Persist, &self.dir, e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn validate_run_id(run_id: &str) -> Result<()> {
    let valid = !run_id.is_empty()
        && run_id != "."
        && run_id != ".."
        && !run_id.contains(['/', '\\'])
        && !run_id.chars().any(char::is_control);
    if !valid {
        return Err(DispatchError::configuration(
            Stage::Persist,
            format!("invalid run id '{run_id}'"),
        ));
    }
    Ok(())
}
