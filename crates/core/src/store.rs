//! JSON stage-file persistence.
//!
//! Each pipeline stage reads the previous stage's file and writes its own,
//! so stages can be re-run independently. Files are pretty-printed for easy
//! manual review.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// Serialize a value to a pretty-printed JSON file, creating parent
/// directories as needed.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Deserialize a value from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Load a stage file, reporting which stage has to run first if it is
/// missing.
pub fn load_stage<T: DeserializeOwned>(path: &Path, stage: &'static str) -> Result<T> {
    if !path.exists() {
        return Err(Error::MissingStage {
            path: path.to_path_buf(),
            stage,
        });
    }
    load_json(path)
}
