use crate::error::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONVERSATIONS_FILE: &str = "conversations.json";

/// File-backed store for the serialized conversation map
#[derive(Debug, Clone)]
pub struct ConversationStore {
    data_dir: PathBuf,
    path: PathBuf,
}

impl ConversationStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let path = data_dir.join(CONVERSATIONS_FILE);
        Self { data_dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Read the serialized map. A missing or blank file means no prior state.
    pub fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => {
                debug!(path = %self.path.display(), bytes = content.len(), "Read conversations");
                Ok(Some(content))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the stored map. Writes to a sibling file first so a crash never leaves half a file.
    pub fn save(&self, serialized: &str) -> Result<()> {
        self.ensure_directories()?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized)?;
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), bytes = serialized.len(), "Wrote conversations");
        Ok(())
    }
}
