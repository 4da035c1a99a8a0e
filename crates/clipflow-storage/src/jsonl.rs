//! Audit log persisted as JSON-lines files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use clipflow_models::{AcquisitionAttempt, ContentId, ErrorRecord};

use crate::error::StorageResult;
use crate::store::AuditLog;

const ERRORS_FILE: &str = "errors.jsonl";
const ATTEMPTS_FILE: &str = "attempts.jsonl";

/// Append one JSON value as a line.
pub async fn append_json_line<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

/// Read every parseable line. Corrupt lines are skipped with a warning.
pub async fn read_json_lines<T: DeserializeOwned>(path: &Path) -> StorageResult<Vec<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(v) => out.push(v),
            Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "Skipping corrupt line"),
        }
    }
    Ok(out)
}

/// Audit log writing `errors.jsonl` and `attempts.jsonl` under one directory.
pub struct JsonlAuditLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append_error(&self, record: &ErrorRecord) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        append_json_line(&self.dir.join(ERRORS_FILE), record).await
    }

    async fn append_attempt(&self, attempt: &AcquisitionAttempt) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        append_json_line(&self.dir.join(ATTEMPTS_FILE), attempt).await
    }

    async fn errors(&self) -> StorageResult<Vec<ErrorRecord>> {
        read_json_lines(&self.dir.join(ERRORS_FILE)).await
    }

    async fn attempts_for(&self, content_id: &ContentId) -> StorageResult<Vec<AcquisitionAttempt>> {
        let all: Vec<AcquisitionAttempt> = read_json_lines(&self.dir.join(ATTEMPTS_FILE)).await?;
        Ok(all
            .into_iter()
            .filter(|a| &a.content_id == content_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipflow_models::{ErrorTier, Stage};

    #[tokio::test]
    async fn test_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("audit"));
        let cid = ContentId::new();

        log.append_attempt(&AcquisitionAttempt::failed(
            cid.clone(),
            "v1",
            "cookie_session",
            1,
            ErrorTier::Persistent,
            "HTTP 403",
        ))
        .await
        .unwrap();
        log.append_attempt(&AcquisitionAttempt::succeeded(
            ContentId::new(),
            "v2",
            "proxy",
            1,
        ))
        .await
        .unwrap();
        log.append_error(&ErrorRecord::new(
            ErrorTier::Critical,
            Stage::Effects,
            "fatal",
            serde_json::json!({"clip": "c1"}),
            false,
        ))
        .await
        .unwrap();

        let attempts = log.attempts_for(&cid).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].is_failure());
        assert_eq!(log.errors().await.unwrap()[0].tier, ErrorTier::Critical);
    }

    #[tokio::test]
    async fn test_corrupt_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jsonl");
        append_json_line(&path, &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap()
            .write_all(b"{not json\n")
            .await
            .unwrap();

        let rows: Vec<serde_json::Value> = read_json_lines(&path).await.unwrap();
        assert_eq!(rows.len(), 1);
        let missing: Vec<serde_json::Value> =
            read_json_lines(&dir.path().join("none.jsonl")).await.unwrap();
        assert!(missing.is_empty());
    }
}
