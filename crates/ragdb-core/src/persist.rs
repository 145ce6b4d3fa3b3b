//! Versioned JSON snapshots shared by the corpus store and the vector index.
//!
//! Every snapshot is an object with a top-level `schema_version`. Readers
//! check it before decoding the rest so an old or future file fails with
//! `IncompatibleStoreVersion` instead of an opaque decode error.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    schema_version: u32,
}

/// Serialize `value` to `path` through a sibling temp file and a rename, so a
/// crash mid-write never leaves a truncated snapshot behind.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);
    {
        let mut file = fs::File::create(tmp)?;
        serde_json::to_writer(&mut file, value)?;
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)?;
    debug!(path = %path.display(), "snapshot written");
    Ok(())
}

/// Read a snapshot written with `schema_version == supported`.
pub fn read_versioned<T: DeserializeOwned>(path: &Path, supported: u32) -> Result<T> {
    let bytes = fs::read(path)?;
    let probe: VersionProbe = serde_json::from_slice(&bytes)?;
    if probe.schema_version != supported {
        return Err(Error::IncompatibleStoreVersion { found: probe.schema_version, supported });
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// IEEE-754 bit patterns; JSON numbers do not round-trip every `f32`.
pub fn f32s_to_bits(v: &[f32]) -> Vec<u32> {
    v.iter().map(|x| x.to_bits()).collect()
}

pub fn bits_to_f32s(v: &[u32]) -> Vec<f32> {
    v.iter().map(|b| f32::from_bits(*b)).collect()
}
