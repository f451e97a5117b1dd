use log::{debug, warn};
use std::{
    io::ErrorKind,
    sync::{Mutex, PoisonError},
};
use tempfile::TempPath;

/// Temporary files owned by a fixture until teardown.
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    temp_files: Mutex<Vec<TempPath>>,
}

impl CleanupRegistry {
    pub fn adopt(&self, temp_file: Option<TempPath>) {
        if let Some(temp_file) = temp_file {
            debug!("🐋 Tracking temporary file {}", temp_file.display());
            self.temp_files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(temp_file);
        }
    }

    pub fn len(&self) -> usize {
        self.temp_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every tracked file. Files that are already gone are fine.
    pub fn purge(&self) {
        let temp_files: Vec<TempPath> = self
            .temp_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for temp_file in temp_files {
            let path = temp_file.to_path_buf();
            match temp_file.close() {
                Ok(()) => debug!("🐋 Removed temporary file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("🐋 Could not remove temporary file {}: {e}", path.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripts::InitScripts;

    #[test]
    fn purge_removes_adopted_files() {
        let registry = CleanupRegistry::default();
        let resolved = InitScripts::inline("select 1;").resolve().unwrap();
        let path = resolved.temp_file.as_ref().unwrap().to_path_buf();

        registry.adopt(resolved.temp_file);
        registry.adopt(None);
        assert_eq!(registry.len(), 1);

        registry.purge();
        assert!(!path.exists());
        assert!(registry.is_empty());
    }

    #[test]
    fn purge_tolerates_files_removed_behind_its_back() {
        let registry = CleanupRegistry::default();
        let resolved = InitScripts::inline("select 1;").resolve().unwrap();
        let path = resolved.temp_file.as_ref().unwrap().to_path_buf();
        registry.adopt(resolved.temp_file);

        std::fs::remove_file(&path).unwrap();
        registry.purge();
        registry.purge();

        assert!(registry.is_empty());
    }
}
