//! Peer registry persistence.
//!
//! Peer ids are only stable for as long as the registry lives. Saving it on
//! shutdown and restoring it on start keeps a peripheral's id (and therefore
//! the master's log lines about it) the same across restarts. The file holds
//! a `bincode`-encoded [`RegistrySnapshot`].

use std::path::{Path, PathBuf};

use splitkb_core::peer::{PeerRegistry, RegistryError, RegistrySnapshot};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error accessing peer registry at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("peer registry file is corrupt: {0}")]
    Registry(#[from] RegistryError),
}

/// Writes `registry` to `path`, creating parent directories as needed.
pub fn save_registry(path: &Path, registry: &PeerRegistry) -> Result<(), StorageError> {
    let bytes = registry.snapshot().to_bytes()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, bytes).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), peers = registry.len(), "peer registry saved");
    Ok(())
}

/// Reads a registry saved by [`save_registry`].
///
/// Returns `Ok(None)` when the file does not exist yet.
pub fn load_registry(path: &Path) -> Result<Option<PeerRegistry>, StorageError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no saved peer registry");
            return Ok(None);
        }
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let snapshot = RegistrySnapshot::from_bytes(&bytes)?;
    let registry = PeerRegistry::restore(&snapshot)?;
    info!(path = %path.display(), peers = registry.len(), "peer registry restored");
    Ok(Some(registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitkb_core::peer::PeerAddress;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("splitkb_peers_test_{}_{name}", std::process::id()))
            .join("peers.bin")
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let result = load_registry(Path::new("/nonexistent/splitkb/peers.bin"));
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_saved_registry_restores_same_ids() {
        // Arrange
        let path = temp_file("round_trip");
        let left = PeerAddress::new([0x02, 0, 0, 0, 0, 0x10]);
        let right = PeerAddress::new([0x02, 0, 0, 0, 0, 0x11]);
        let mut registry = PeerRegistry::with_master(PeerAddress::new([0x02, 0, 0, 0, 0, 1]));
        registry.register(left);
        registry.register(right);

        // Act
        save_registry(&path, &registry).expect("save");
        let restored = load_registry(&path).expect("load").expect("present");

        // Assert
        assert_eq!(restored.id_of(left), Some(1));
        assert_eq!(restored.id_of(right), Some(2));
        assert_eq!(restored.master(), registry.master());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_garbage_file_is_reported_as_corrupt() {
        let path = temp_file("garbage");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, [0xFF; 3]).unwrap();

        let result = load_registry(&path);

        assert!(matches!(result, Err(StorageError::Registry(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
