//! Blob operations: the put/get half of the content store.
//!
//! Every schema, super schema and row is persisted as a JSON blob. All the
//! values we serialize are built from `BTreeMap`s and ordered `Vec`s, so the
//! same logical value always produces the same bytes and therefore the same
//! blob id.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// serialize a value to JSON and write it as a blob
///
/// returns the blob ID (SHA-1 hash of the content)
pub fn write_json<T: Serialize>(repo: &git2::Repository, value: &T) -> StorageResult<BlobId> {
    let bytes = serde_json::to_vec(value)?;
    write_blob(repo, &bytes)
}

/// read a blob and deserialize it from JSON
///
/// `path` is only used to describe where the blob lives when it fails to parse
pub fn read_json<T: DeserializeOwned>(
    repo: &git2::Repository,
    blob_id: BlobId,
    path: &str,
) -> StorageResult<T> {
    let bytes = read_blob(repo, blob_id)?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::CorruptedData {
        path: path.into(),
        reason: e.to_string(),
    })
}

/// write raw bytes as a blob
pub fn write_blob(repo: &git2::Repository, bytes: &[u8]) -> StorageResult<BlobId> {
    let oid = repo.blob(bytes)?;
    Ok(BlobId::new(oid))
}

/// read a blob's content from the repository
pub fn read_blob(repo: &git2::Repository, blob_id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo.find_blob(blob_id.raw())?;
    Ok(blob.content().to_vec())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, git2::Repository) {
        let dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_same_value_same_blob() {
        let (_dir, repo) = setup_repo();

        let mut a = BTreeMap::new();
        a.insert(2u64, "two".to_string());
        a.insert(1u64, "one".to_string());

        let mut b = BTreeMap::new();
        b.insert(1u64, "one".to_string());
        b.insert(2u64, "two".to_string());

        let id_a = write_json(&repo, &a).unwrap();
        let id_b = write_json(&repo, &b).unwrap();
        assert_eq!(id_a, id_b);

        let restored: BTreeMap<u64, String> = read_json(&repo, id_a, "test").unwrap();
        assert_eq!(restored, a);
    }

    #[test]
    fn test_corrupted_blob_detected() {
        let (_dir, repo) = setup_repo();
        let id = write_blob(&repo, b"{not json").unwrap();

        let result: StorageResult<BTreeMap<u64, String>> = read_json(&repo, id, "t/schema.json");
        assert!(matches!(result, Err(StorageError::CorruptedData { .. })));
    }
}
