use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::users::repo_types::User;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("users file io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("users file {path} is not a valid user list: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode users: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("email already registered")]
    DuplicateEmail,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

/// Flat-file user collection: one pretty-printed JSON array.
///
/// Reads go straight to disk. Writes are serialized by `write_guard`, which
/// covers the reload, the uniqueness re-check and the rename of the new file,
/// so two registrations for the same email cannot both land.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl UserStore {
    /// Opens the store at `path`, creating an empty collection (and any missing
    /// parent directories) if the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let exists = tokio::fs::try_exists(&path).await.map_err(io_error(&path))?;
        if !exists {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(io_error(parent))?;
            }
            tokio::fs::write(&path, b"[]")
                .await
                .map_err(io_error(&path))?;
            info!(path = %path.display(), "created empty users file");
        }

        Ok(Self {
            path,
            write_guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole collection.
    pub async fn load(&self) -> Result<Vec<User>, StoreError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(io_error(&self.path))?;
        serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Find a user by exact (case-sensitive) email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.load().await?;
        Ok(users.into_iter().find(|u| u.email == email))
    }

    /// Appends `user` unless its email is already taken.
    pub async fn insert(&self, user: User) -> Result<User, StoreError> {
        let _guard = self.write_guard.lock().await;

        let mut users = self.load().await?;
        if users.iter().any(|u| u.email == user.email) {
            warn!(email = %user.email, "email taken while waiting for write guard");
            return Err(StoreError::DuplicateEmail);
        }

        users.push(user.clone());
        self.replace_contents(&users).await?;

        debug!(user_id = %user.id, total = users.len(), "users file rewritten");
        Ok(user)
    }

    // Write next to the target and rename over it so readers never see a
    // half-written file.
    async fn replace_contents(&self, users: &[User]) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(users).map_err(StoreError::Encode)?;
        let staging = self.staging_path();

        if let Err(source) = tokio::fs::write(&staging, &body).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StoreError::Io {
                path: staging,
                source,
            });
        }

        if let Err(source) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StoreError::Io {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "users.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn user(email: &str) -> User {
        User::new("Test".into(), email.into(), "$argon2id$fake".into())
    }

    #[tokio::test]
    async fn open_bootstraps_empty_collection_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("user.json");

        let store = UserStore::open(&path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_keeps_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");
        let first = UserStore::open(&path).await.unwrap();
        first.insert(user("a@x.com")).await.unwrap();

        let reopened = UserStore::open(&path).await.unwrap();
        let users = reopened.load().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "a@x.com");
    }

    #[tokio::test]
    async fn insert_appends_in_order_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("user.json")).await.unwrap();

        store.insert(user("a@x.com")).await.unwrap();
        store.insert(user("b@x.com")).await.unwrap();

        let emails: Vec<_> = store
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        assert_eq!(emails, ["a@x.com", "b@x.com"]);
        assert!(!store.staging_path().exists());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n  {"), "expected pretty JSON, got {raw}");
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("user.json")).await.unwrap();
        store.insert(user("a@x.com")).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let err = store.insert(user("a@x.com")).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn email_match_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("user.json")).await.unwrap();
        store.insert(user("ana@x.com")).await.unwrap();

        assert!(store.find_by_email("ana@x.com").await.unwrap().is_some());
        assert!(store.find_by_email("Ana@x.com").await.unwrap().is_none());
        store.insert(user("Ana@x.com")).await.unwrap();
    }

    #[tokio::test]
    async fn insert_preserves_unknown_keys_of_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");
        let seeded = serde_json::json!([{
            "id": "6f1c2b1e-8a44-4c1a-9d8e-0c9b5f2a7d11",
            "name": "Admin",
            "email": "admin@x.com",
            "password": "$argon2id$stub",
            "createdAt": "2024-01-02T03:04:05Z",
            "updatedAt": "2024-01-02T03:04:05Z",
            "role": "admin"
        }]);
        std::fs::write(&path, seeded.to_string()).unwrap();
        let store = UserStore::open(&path).await.unwrap();

        store.insert(user("b@x.com")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0], seeded[0]);
        assert_eq!(raw[1]["email"], "b@x.com");
        assert!(raw[1].get("role").is_none());
    }

    #[tokio::test]
    async fn failed_staging_write_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("user.json")).await.unwrap();
        store.insert(user("a@x.com")).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();
        // A directory in the staging slot makes the write fail even as root.
        std::fs::create_dir(store.staging_path()).unwrap();

        let err = store.insert(user("b@x.com")).await.unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
        assert!(store.staging_path().is_dir());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = UserStore::open(&path).await.unwrap();

        assert!(matches!(
            store.load().await.unwrap_err(),
            StoreError::Corrupt { .. }
        ));
        assert!(matches!(
            store.insert(user("a@x.com")).await.unwrap_err(),
            StoreError::Corrupt { .. }
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_of_same_email_keep_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(UserStore::open(dir.path().join("user.json")).await.unwrap());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.insert(user("same@x.com")).await }));
        }
        let mut ok = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_of_distinct_emails_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(UserStore::open(dir.path().join("user.json")).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.insert(user(&format!("u{i}@x.com"))).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.load().await.unwrap().len(), 8);
    }
}
