// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user uploaded-file tracking with deferred downloads.
//!
//! A file upload only records metadata; the bytes are fetched when a
//! subsequent task for the same user actually needs them. Uploads that
//! are never followed by a task cost no bandwidth or disk.
//!
//! Every user gets a private subtree under the base directory:
//! `users/{user_id}/data` for resolved attachments and
//! `users/{user_id}/output` for analysis artifacts. User ids and
//! filenames are sanitized into single path components, so no path
//! computed for one user can land inside another user's tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tally_core::TallyError;
use tally_core::traits::PlatformClient;
use tally_core::types::UserId;

/// Metadata for one uploaded file belonging to a user.
#[derive(Debug, Clone)]
pub struct UserFileRecord {
    pub file_key: String,
    pub filename: String,
    pub recorded_at: DateTime<Utc>,
    /// Set once the bytes have been fetched and persisted.
    pub downloaded: bool,
    /// Set once a task has claimed this record as an attachment.
    pub attached: bool,
    pub local_path: Option<PathBuf>,
}

/// Result of resolving a user's pending downloads.
///
/// Partial failure is not rolled back: `resolved` holds every path that
/// was persisted (in original arrival order) even when `failed` is
/// non-empty, and the caller decides whether to proceed with partial
/// data or abort.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Local paths of files resolved by this call, arrival order.
    pub resolved: Vec<PathBuf>,
    /// File keys whose download failed.
    pub failed: Vec<String>,
}

impl ResolveReport {
    /// True when every pending download succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks uploaded-file metadata per user and resolves deferred downloads.
pub struct UserFileRegistry {
    base_dir: PathBuf,
    files: std::sync::Mutex<HashMap<String, Vec<UserFileRecord>>>,
    /// Per-user resolution locks. Held for the whole download-and-mark
    /// sequence so two tasks racing for the same user cannot
    /// double-download or corrupt the downloaded flag.
    resolve_locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserFileRegistry {
    /// Creates a registry rooted at `base_dir` (created if missing).
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, TallyError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        info!(base_dir = %base_dir.display(), "user file registry initialized");
        Ok(Self {
            base_dir,
            files: std::sync::Mutex::new(HashMap::new()),
            resolve_locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// The data directory for a user's resolved attachments (created on demand).
    pub fn user_data_dir(&self, user_id: &UserId) -> Result<PathBuf, TallyError> {
        let dir = self.user_dir(user_id).join("data");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// The output directory for a user's analysis artifacts (created on demand).
    pub fn user_output_dir(&self, user_id: &UserId) -> Result<PathBuf, TallyError> {
        let dir = self.user_dir(user_id).join("output");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn user_dir(&self, user_id: &UserId) -> PathBuf {
        self.base_dir
            .join("users")
            .join(sanitize_component(&user_id.0))
    }

    /// Appends a pending record for a freshly uploaded file.
    ///
    /// Metadata only; the network is not touched until a task for this
    /// user triggers [`resolve_pending`](Self::resolve_pending).
    pub fn record_file(&self, user_id: &UserId, file_key: &str, filename: &str) {
        let record = UserFileRecord {
            file_key: file_key.to_string(),
            filename: filename.to_string(),
            recorded_at: Utc::now(),
            downloaded: false,
            attached: false,
            local_path: None,
        };

        let mut files = lock(&self.files);
        files.entry(user_id.0.clone()).or_default().push(record);
        info!(
            user_id = %user_id.0,
            file_key,
            filename,
            "file recorded for deferred download"
        );
    }

    /// Snapshot of the user's unclaimed file keys, marking them claimed.
    ///
    /// The returned keys form the fixed attachment list of exactly one
    /// task; files arriving later belong to the next task.
    pub fn claim_pending(&self, user_id: &UserId) -> Vec<String> {
        let mut files = lock(&self.files);
        let Some(records) = files.get_mut(&user_id.0) else {
            return Vec::new();
        };
        records
            .iter_mut()
            .filter(|r| !r.attached)
            .map(|r| {
                r.attached = true;
                r.file_key.clone()
            })
            .collect()
    }

    /// Returns claimed keys to the pending pool.
    ///
    /// Used when a task submission was rejected so the files are picked
    /// up by the user's next attempt instead of being orphaned.
    pub fn release_claim(&self, user_id: &UserId, file_keys: &[String]) {
        let mut files = lock(&self.files);
        if let Some(records) = files.get_mut(&user_id.0) {
            for record in records.iter_mut() {
                if file_keys.contains(&record.file_key) {
                    record.attached = false;
                }
            }
        }
    }

    /// All records currently held for a user (diagnostics and tests).
    pub fn records(&self, user_id: &UserId) -> Vec<UserFileRecord> {
        lock(&self.files)
            .get(&user_id.0)
            .cloned()
            .unwrap_or_default()
    }

    /// Downloads every undownloaded record belonging to `user_id`.
    ///
    /// Invokes `downloader.download_file` exactly once per pending
    /// record, persists the bytes under the user's data directory, and
    /// marks the record downloaded. Holds the user's resolution lock for
    /// the whole sequence; a concurrent resolver for the same user waits
    /// and then finds nothing left to do.
    pub async fn resolve_pending(
        &self,
        user_id: &UserId,
        downloader: &dyn PlatformClient,
    ) -> Result<ResolveReport, TallyError> {
        let user_lock = self.user_resolve_lock(user_id);
        let _guard = user_lock.lock().await;

        // Snapshot the pending set under the map lock, then download
        // without holding it.
        let pending: Vec<(String, String)> = {
            let files = lock(&self.files);
            files
                .get(&user_id.0)
                .map(|records| {
                    records
                        .iter()
                        .filter(|r| !r.downloaded)
                        .map(|r| (r.file_key.clone(), r.filename.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        if pending.is_empty() {
            return Ok(ResolveReport::default());
        }

        let data_dir = self.user_data_dir(user_id)?;
        let mut report = ResolveReport::default();

        for (file_key, filename) in pending {
            match downloader.download_file(&file_key).await {
                Ok(bytes) => {
                    let path = data_dir.join(sanitize_component(&filename));
                    tokio::fs::write(&path, &bytes).await?;
                    self.mark_downloaded(user_id, &file_key, &path);
                    debug!(
                        user_id = %user_id.0,
                        file_key,
                        path = %path.display(),
                        bytes = bytes.len(),
                        "attachment resolved"
                    );
                    report.resolved.push(path);
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id.0,
                        file_key,
                        error = %e,
                        "attachment download failed, keeping earlier results"
                    );
                    report.failed.push(file_key);
                }
            }
        }

        Ok(report)
    }

    fn mark_downloaded(&self, user_id: &UserId, file_key: &str, path: &Path) {
        let mut files = lock(&self.files);
        if let Some(records) = files.get_mut(&user_id.0)
            && let Some(record) = records.iter_mut().find(|r| r.file_key == file_key)
        {
            record.downloaded = true;
            record.local_path = Some(path.to_path_buf());
        }
    }

    fn user_resolve_lock(&self, user_id: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = lock(&self.resolve_locks);
        Arc::clone(locks.entry(user_id.0.clone()).or_default())
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reduces an arbitrary string to a single safe path component.
///
/// Strips any directory structure, replaces characters outside
/// `[A-Za-z0-9._-]`, and rejects dot-only results, so a hostile user id
/// or filename cannot escape the user's subtree.
fn sanitize_component(raw: &str) -> String {
    let name = Path::new(raw)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
