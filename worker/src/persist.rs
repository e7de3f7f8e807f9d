//! Loading and saving the store as a JSON snapshot file.

use crate::error::Result;
use std::io::ErrorKind;
use std::path::Path;
use tidy_engine::{MemoryStore, SnapshotMetadata, StoreSnapshot};

/// Load a store from `path`. A missing file yields an empty store.
pub async fn load_store(path: &Path) -> Result<MemoryStore> {
    let store = MemoryStore::new();

    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no snapshot yet, starting empty");
            return Ok(store);
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot = StoreSnapshot::from_json(&json)?;
    let metadata = SnapshotMetadata::from(&snapshot);
    store.import_state(snapshot)?;
    tracing::info!(
        path = %path.display(),
        accounts = metadata.account_count,
        blogs = metadata.blog_count,
        posts = metadata.post_count,
        cached_like_users = metadata.cached_like_user_count,
        "loaded snapshot"
    );
    Ok(store)
}

/// Write the committed state of `store` to `path`.
///
/// The snapshot goes to a sibling temporary file first and is then renamed
/// over `path`, so readers never see a half-written file.
pub async fn save_store(store: &MemoryStore, path: &Path) -> Result<()> {
    let json = store.export_state()?.to_json_pretty()?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;

    tracing::debug!(path = %path.display(), "saved snapshot");
    Ok(())
}
