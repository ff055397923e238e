//! Persistence of the source list.
//!
//! Sources are stored as TOML:
//!
//! ```toml
//! [[sources]]
//! path = "/data/photos"
//! recursive = true
//! targets = ["/mnt/backup/photos"]
//! exceptions = ["/data/photos/cache"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::source::SourceConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SourceFile {
    #[serde(default)]
    sources: Vec<SourceConfig>,
}

/// Load the source list. A missing file is an empty list.
pub fn load(path: &Path) -> Result<Vec<SourceConfig>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let file: SourceFile = toml::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.sources)
}

/// Save the source list, creating parent directories as needed.
pub fn save(path: &Path, sources: &[SourceConfig]) -> Result<(), StoreError> {
    let file = SourceFile {
        sources: sources.to_vec(),
    };
    let content = toml::to_string_pretty(&file)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}
