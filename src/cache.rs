//! Versioned on-disk envelope for precomputed compound databases:
//! a magic tag and format version byte followed by a gzip-compressed
//! bincode payload.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::compound::Compound;
use crate::error::{MimiError, Result};
use crate::mass::IonMode;

const MAGIC: &[u8; 8] = b"MIMICACH";
const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Provenance recorded alongside the compounds of a cache.
pub struct CacheMetadata {
    pub creation_date: String,
    pub version: String,
    pub ionization_mode: IonMode,
    pub full_command: String,
    pub compound_db_files: Vec<String>,
    pub isotope_data_file: String,
    pub labeled_atoms_file: Option<String>,
    pub cache_output_file: String,
    pub noise_cutoff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A precomputed compound database: provenance metadata plus compounds in
/// insertion order, keyed by external id.
pub struct CompoundDatabase {
    pub metadata: CacheMetadata,
    pub compounds: IndexMap<String, Compound>,
}

impl CompoundDatabase {
    /// Serialize to `path`, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MimiError::io(parent.display().to_string(), e))?;
            }
        }
        let context = path.display().to_string();
        let file = File::create(path).map_err(|e| MimiError::io(context.clone(), e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(MAGIC)
            .map_err(|e| MimiError::io(context.clone(), e))?;
        writer
            .write_all(&[FORMAT_VERSION])
            .map_err(|e| MimiError::io(context.clone(), e))?;
        let mut encoder = GzEncoder::new(writer, Compression::default());
        bincode::serialize_into(&mut encoder, self).map_err(|e| {
            MimiError::io(
                context.clone(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        let mut writer = encoder
            .finish()
            .map_err(|e| MimiError::io(context.clone(), e))?;
        writer.flush().map_err(|e| MimiError::io(context, e))?;
        Ok(())
    }

    /// Deserialize from `path`, rejecting envelopes with the wrong magic or
    /// an unrecognized format version.
    pub fn read(path: &Path) -> Result<Self> {
        let context = path.display().to_string();
        let file = File::open(path).map_err(|e| MimiError::io(context.clone(), e))?;
        let mut reader = BufReader::new(file);
        let mut header = [0u8; 9];
        reader
            .read_exact(&mut header)
            .map_err(|e| MimiError::io(context.clone(), e))?;
        if header[..8] != MAGIC[..] {
            return Err(MimiError::IncompatibleCache(format!(
                "'{context}' is not a mimi cache file"
            )));
        }
        let version = header[8];
        if version != FORMAT_VERSION {
            return Err(MimiError::IncompatibleCache(format!(
                "'{context}' has format version {version}, expected {FORMAT_VERSION}"
            )));
        }
        bincode::deserialize_from(GzDecoder::new(reader)).map_err(|e| {
            MimiError::IncompatibleCache(format!("'{context}' payload could not be decoded: {e}"))
        })
    }
}
