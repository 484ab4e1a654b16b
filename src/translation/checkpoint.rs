/*!
 * Durable snapshots of translated entries.
 *
 * Two kinds of snapshot are kept next to the output file:
 * - `<output>.progress` holds everything merged so far across chunks
 * - `<output>.progress.chunk<id>` holds what one chunk has finished so far
 *
 * Each snapshot is a small JSON envelope written through a temporary file and
 * renamed into place, so an interrupted write leaves the previous snapshot intact.
 */

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::CheckpointError;
use crate::file_utils::FileManager;
use crate::subtitle_processor::SubtitleEntry;

/// Snapshot format version written by this build
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a [SubtitleEntry],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<SubtitleEntry>,
}

/// Checkpoint files belonging to one output path
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    // @field: Output file the snapshots belong to
    output_path: PathBuf,
}

impl CheckpointStore {
    /// Store for the checkpoints of `output_path`
    pub fn for_output<P: AsRef<Path>>(output_path: P) -> Self {
        Self {
            output_path: output_path.as_ref().to_path_buf(),
        }
    }

    /// Output file this store belongs to
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// `<output>.progress`
    pub fn global_path(&self) -> PathBuf {
        let mut path = self.output_path.clone().into_os_string();
        path.push(".progress");
        PathBuf::from(path)
    }

    /// `<output>.progress.chunk<id>`
    pub fn chunk_path(&self, chunk_id: usize) -> PathBuf {
        let mut path = self.global_path().into_os_string();
        path.push(format!(".chunk{}", chunk_id));
        PathBuf::from(path)
    }

    pub async fn save_chunk(&self, chunk_id: usize, entries: &[SubtitleEntry]) -> Result<(), CheckpointError> {
        write_snapshot(self.chunk_path(chunk_id), entries).await
    }

    pub async fn load_chunk(&self, chunk_id: usize) -> Result<Option<Vec<SubtitleEntry>>, CheckpointError> {
        read_snapshot(self.chunk_path(chunk_id)).await
    }

    pub async fn delete_chunk(&self, chunk_id: usize) -> Result<(), CheckpointError> {
        remove_snapshot(self.chunk_path(chunk_id)).await
    }

    pub async fn save_global(&self, entries: &[SubtitleEntry]) -> Result<(), CheckpointError> {
        write_snapshot(self.global_path(), entries).await
    }

    pub async fn load_global(&self) -> Result<Option<Vec<SubtitleEntry>>, CheckpointError> {
        read_snapshot(self.global_path()).await
    }

    pub async fn delete_global(&self) -> Result<(), CheckpointError> {
        remove_snapshot(self.global_path()).await
    }

    /// Whether a global snapshot exists, i.e. a previous run did not finish
    pub fn has_global(&self) -> bool {
        FileManager::file_exists(self.global_path())
    }

    /// Remove the global snapshot and every chunk snapshot found next to it
    pub async fn clear_all(&self) -> Result<(), CheckpointError> {
        self.delete_global().await?;

        let dir = FileManager::parent_dir(&self.output_path);
        let mut prefix = self.global_path().file_name().unwrap_or_default().to_os_string();
        prefix.push(".chunk");
        let prefix = prefix.to_string_lossy().into_owned();

        let chunk_files = run_blocking(move || list_chunk_files(&dir, &prefix)).await??;
        for path in chunk_files {
            remove_snapshot(path).await?;
        }
        Ok(())
    }
}

/// Run file work on the blocking pool so runtime threads keep driving other chunks
async fn run_blocking<T, F>(work: F) -> Result<T, CheckpointError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CheckpointError::Task(e.to_string()))
}

/// `<prefix><digits>` files in `dir`
fn list_chunk_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, CheckpointError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CheckpointError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| CheckpointError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_chunk = name
            .strip_prefix(prefix)
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()));
        if is_chunk {
            files.push(entry.path());
        }
    }
    Ok(files)
}

async fn write_snapshot(path: PathBuf, entries: &[SubtitleEntry]) -> Result<(), CheckpointError> {
    let snapshot = SnapshotRef {
        version: CHECKPOINT_VERSION,
        entries,
    };
    let bytes = serde_json::to_vec(&snapshot).map_err(CheckpointError::Serialize)?;
    let count = entries.len();

    run_blocking(move || {
        FileManager::write_atomic_bytes(&path, &bytes).map_err(|e| CheckpointError::Persist {
            path: path.clone(),
            message: e.to_string(),
        })?;
        debug!("Saved checkpoint {:?} ({} entries)", path, count);
        Ok(())
    })
    .await?
}

async fn read_snapshot(path: PathBuf) -> Result<Option<Vec<SubtitleEntry>>, CheckpointError> {
    run_blocking(move || read_snapshot_blocking(&path)).await?
}

fn read_snapshot_blocking(path: &Path) -> Result<Option<Vec<SubtitleEntry>>, CheckpointError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Deserialize {
        path: path.to_path_buf(),
        source,
    })?;

    if snapshot.version != CHECKPOINT_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: snapshot.version,
        });
    }

    debug!("Loaded checkpoint {:?} ({} entries)", path, snapshot.entries.len());
    Ok(Some(snapshot.entries))
}

async fn remove_snapshot(path: PathBuf) -> Result<(), CheckpointError> {
    run_blocking(move || {
        FileManager::remove_if_exists(&path)
            .map(|_| ())
            .map_err(|source| CheckpointError::Io { path, source })
    })
    .await?
}
