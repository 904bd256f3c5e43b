use std::path::{Path, PathBuf};

use snafu::ResultExt;

use super::error::{ParseSessionSnafu, ReadSessionSnafu, ServiceResult};
use super::service::SessionStore;
use super::types::SessionRecord;

/// Session store backed by a JSON document written at sign-in.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> ServiceResult<Option<SessionRecord>> {
        if !self.path.exists() {
            tracing::debug!(path = ?self.path, "session file not found");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).context(ReadSessionSnafu {
            stage: "read-session-file",
            path: self.path.clone(),
        })?;
        let record: SessionRecord = serde_json::from_str(&content).context(ParseSessionSnafu {
            stage: "parse-session-file",
            path: self.path.clone(),
        })?;

        // A blank id is as good as no session.
        if record.user_id.as_str().trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;

    #[test]
    fn missing_file_means_signed_out() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileSessionStore::new(dir.path().join("session.json"));

        assert_eq!(store.get().expect("missing file is not an error"), None);
    }

    #[test]
    fn reads_server_issued_identity() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"_id": "64f0c2", "username": "fa", "email": "x@y"}"#)
            .expect("write session");

        let record = FileSessionStore::new(&path)
            .get()
            .expect("session should parse")
            .expect("session should exist");

        assert_eq!(record, SessionRecord::new("64f0c2", "fa"));
    }

    #[test]
    fn blank_identity_is_treated_as_absent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"_id": "   "}"#).expect("write session");

        assert_eq!(FileSessionStore::new(&path).get().expect("parses"), None);
    }

    #[test]
    fn corrupt_file_reports_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").expect("write session");

        assert!(matches!(
            FileSessionStore::new(&path).get(),
            Err(ServiceError::ParseSession { .. })
        ));
    }
}
