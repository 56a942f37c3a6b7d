// ============================
// crates/backend-lib/src/store.rs
// ============================
//! Row-store abstraction with flat-file implementation.
//!
//! This is the seam to the external data service: rows in, rows out,
//! no domain types. The directory parses and validates everything that
//! crosses this boundary.
use async_trait::async_trait;
use serde_json::Value;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs as tokio_fs;

use crate::error::AppError;

/// Trait for meeting row storage backends
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Insert a meeting row. `code` is subject to a unique constraint;
    /// a collision fails the insert and the caller retries with a fresh
    /// code.
    async fn insert_meeting(&self, id: &str, code: &str, row: &Value) -> Result<(), AppError>;

    /// Fetch a meeting row by id
    async fn fetch_meeting(&self, id: &str) -> Result<Option<Value>, AppError>;

    /// Fetch a meeting row by its meeting code
    async fn fetch_meeting_by_code(&self, code: &str) -> Result<Option<Value>, AppError>;

    /// Read all meeting rows
    async fn list_meetings(&self) -> Result<Vec<Value>, AppError>;

    /// Overwrite a meeting row
    async fn update_meeting(&self, id: &str, row: &Value) -> Result<(), AppError>;

    /// Delete a meeting row together with its roster and code index entry
    async fn delete_meeting(&self, id: &str) -> Result<(), AppError>;

    /// Append a participant row to a meeting's roster
    async fn insert_participant(&self, meeting_id: &str, row: &Value) -> Result<(), AppError>;

    /// Read a meeting's roster rows
    async fn list_participants(&self, meeting_id: &str) -> Result<Vec<Value>, AppError>;

    /// Replace a meeting's roster rows wholesale
    async fn replace_participants(
        &self,
        meeting_id: &str,
        rows: &[Value],
    ) -> Result<(), AppError>;
}

/// Flat-file implementation of the `MeetingStore` trait
#[derive(Clone)]
pub struct FlatFileStore {
    root: PathBuf,
}

impl FlatFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("meetings"))?;
        fs::create_dir_all(root.join("codes"))?;
        fs::create_dir_all(root.join("participants"))?;
        Ok(Self { root })
    }

    fn meeting_path(&self, id: &str) -> PathBuf {
        self.root.join("meetings").join(format!("{id}.json"))
    }

    fn code_path(&self, code: &str) -> PathBuf {
        self.root.join("codes").join(code)
    }

    fn roster_path(&self, meeting_id: &str) -> PathBuf {
        self.root
            .join("participants")
            .join(format!("{meeting_id}.json"))
    }
}

#[async_trait]
impl MeetingStore for FlatFileStore {
    async fn insert_meeting(&self, id: &str, code: &str, row: &Value) -> Result<(), AppError> {
        // claim the code first; create_new stands in for the unique
        // constraint the external data service enforces
        let code_file = self.code_path(code);
        let claim = tokio_fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&code_file)
            .await;

        match claim {
            Ok(_) => {},
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(AppError::DuplicateMeetingCode(code.to_string()));
            },
            Err(err) => return Err(err.into()),
        }

        tokio_fs::write(&code_file, id).await?;

        let json = serde_json::to_string_pretty(row)?;
        tokio_fs::write(self.meeting_path(id), json).await?;

        Ok(())
    }

    async fn fetch_meeting(&self, id: &str) -> Result<Option<Value>, AppError> {
        let path = self.meeting_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio_fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn fetch_meeting_by_code(&self, code: &str) -> Result<Option<Value>, AppError> {
        let path = self.code_path(code);
        if !path.exists() {
            return Ok(None);
        }

        let id = tokio_fs::read_to_string(&path).await?;
        self.fetch_meeting(id.trim()).await
    }

    async fn list_meetings(&self) -> Result<Vec<Value>, AppError> {
        let mut rows = Vec::new();
        let mut entries = tokio_fs::read_dir(self.root.join("meetings")).await?;

        while let Some(entry) = entries.next_entry().await? {
            let content = tokio_fs::read_to_string(entry.path()).await?;
            rows.push(serde_json::from_str(&content)?);
        }

        Ok(rows)
    }

    async fn update_meeting(&self, id: &str, row: &Value) -> Result<(), AppError> {
        let path = self.meeting_path(id);
        if !path.exists() {
            return Err(AppError::MeetingNotFound);
        }

        let json = serde_json::to_string_pretty(row)?;
        tokio_fs::write(path, json).await?;
        Ok(())
    }

    async fn delete_meeting(&self, id: &str) -> Result<(), AppError> {
        let path = self.meeting_path(id);
        if !path.exists() {
            return Err(AppError::MeetingNotFound);
        }

        // drop the code index entry so the code can be reused
        if let Some(code) = self
            .fetch_meeting(id)
            .await?
            .and_then(|row| row.get("meeting_code").and_then(Value::as_str).map(String::from))
        {
            let code_file = self.code_path(&code);
            if code_file.exists() {
                tokio_fs::remove_file(code_file).await?;
            }
        }

        tokio_fs::remove_file(path).await?;

        let roster = self.roster_path(id);
        if roster.exists() {
            tokio_fs::remove_file(roster).await?;
        }

        Ok(())
    }

    async fn insert_participant(&self, meeting_id: &str, row: &Value) -> Result<(), AppError> {
        let mut rows = self.list_participants(meeting_id).await?;
        rows.push(row.clone());
        self.replace_participants(meeting_id, &rows).await
    }

    async fn list_participants(&self, meeting_id: &str) -> Result<Vec<Value>, AppError> {
        let path = self.roster_path(meeting_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio_fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn replace_participants(
        &self,
        meeting_id: &str,
        rows: &[Value],
    ) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(rows)?;
        tokio_fs::write(self.roster_path(meeting_id), json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (FlatFileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FlatFileStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_insert_and_fetch_meeting() {
        let (store, _temp_dir) = setup();
        let row = json!({"id": "m1", "meeting_code": "A1B2C3D4", "title": "Algebra"});

        store.insert_meeting("m1", "A1B2C3D4", &row).await.unwrap();

        let fetched = store.fetch_meeting("m1").await.unwrap().unwrap();
        assert_eq!(fetched["title"], "Algebra");

        let by_code = store.fetch_meeting_by_code("A1B2C3D4").await.unwrap();
        assert_eq!(by_code.unwrap()["id"], "m1");

        assert!(store.fetch_meeting("missing").await.unwrap().is_none());
        assert!(store.fetch_meeting_by_code("ZZZZZZZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let (store, _temp_dir) = setup();
        let row = json!({"id": "m1", "meeting_code": "A1B2C3D4"});

        store.insert_meeting("m1", "A1B2C3D4", &row).await.unwrap();

        let second = json!({"id": "m2", "meeting_code": "A1B2C3D4"});
        let err = store
            .insert_meeting("m2", "A1B2C3D4", &second)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateMeetingCode(code) if code == "A1B2C3D4"));
    }

    #[tokio::test]
    async fn test_list_and_update_meetings() {
        let (store, _temp_dir) = setup();

        store
            .insert_meeting("m1", "AAAA1111", &json!({"id": "m1", "meeting_code": "AAAA1111"}))
            .await
            .unwrap();
        store
            .insert_meeting("m2", "BBBB2222", &json!({"id": "m2", "meeting_code": "BBBB2222"}))
            .await
            .unwrap();

        let rows = store.list_meetings().await.unwrap();
        assert_eq!(rows.len(), 2);

        store
            .update_meeting("m1", &json!({"id": "m1", "meeting_code": "AAAA1111", "status": "cancelled"}))
            .await
            .unwrap();
        let updated = store.fetch_meeting("m1").await.unwrap().unwrap();
        assert_eq!(updated["status"], "cancelled");

        let err = store
            .update_meeting("missing", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MeetingNotFound));
    }

    #[tokio::test]
    async fn test_delete_meeting_releases_code() {
        let (store, _temp_dir) = setup();

        store
            .insert_meeting("m1", "AAAA1111", &json!({"id": "m1", "meeting_code": "AAAA1111"}))
            .await
            .unwrap();
        store.delete_meeting("m1").await.unwrap();

        assert!(store.fetch_meeting("m1").await.unwrap().is_none());

        // the code is free again after deletion
        store
            .insert_meeting("m2", "AAAA1111", &json!({"id": "m2", "meeting_code": "AAAA1111"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_participant_roster() {
        let (store, _temp_dir) = setup();

        assert!(store.list_participants("m1").await.unwrap().is_empty());

        store
            .insert_participant("m1", &json!({"user_id": "alice", "role": "host"}))
            .await
            .unwrap();
        store
            .insert_participant("m1", &json!({"user_id": "bob", "role": "participant"}))
            .await
            .unwrap();

        let roster = store.list_participants("m1").await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0]["user_id"], "alice");

        store
            .replace_participants("m1", &[json!({"user_id": "bob", "role": "participant"})])
            .await
            .unwrap();
        let roster = store.list_participants("m1").await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0]["user_id"], "bob");
    }
}
