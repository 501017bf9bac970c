// Copyright 2022 Paolo Galeone <nessuno@nerdz.eu>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};

use tokio::fs;

use crate::remotes::remote::{self, Remote};

#[derive(Debug)]
pub enum Error {
    Read(io::Error),
    Upload(remote::Error),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Read(error)
    }
}

impl From<remote::Error> for Error {
    fn from(error: remote::Error) -> Self {
        Error::Upload(error)
    }
}

impl std::error::Error for Error {}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Read(error) => write!(f, "Unable to read file: {}", error),
            Error::Upload(error) => write!(f, "{}", error),
        }
    }
}

/// One local file to upload: `root` joined with `relative_path`.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadTarget {
    pub root: PathBuf,
    pub relative_path: PathBuf,
}

impl UploadTarget {
    pub fn new(root: &Path, relative_path: &Path) -> UploadTarget {
        UploadTarget {
            root: root.to_path_buf(),
            relative_path: relative_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(&self.relative_path)
    }
}

#[derive(Debug)]
pub enum UploadOutcome {
    Success {
        relative_path: PathBuf,
        remote_key: String,
    },
    Failure {
        relative_path: PathBuf,
        error: Error,
    },
}

impl UploadOutcome {
    pub fn relative_path(&self) -> &Path {
        match self {
            UploadOutcome::Success { relative_path, .. } => relative_path,
            UploadOutcome::Failure { relative_path, .. } => relative_path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }
}

/// How many times a failed put is tried, and how long to wait in between.
/// The wait doubles after every failed try.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 1,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay before try number `attempt + 1`, `attempt` starting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX)
    }
}

/// The object key of a file: its path relative to the dist directory,
/// always separated by `/`. Paths that leave the directory (`..`) or are
/// absolute have no key.
pub fn remote_key(relative_path: &Path) -> Result<String, remote::Error> {
    let mut parts = vec![];
    for component in relative_path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(remote::Error::InvalidKey(
                    relative_path.display().to_string(),
                ))
            }
        }
    }
    if parts.is_empty() {
        return Err(remote::Error::InvalidKey(
            relative_path.display().to_string(),
        ));
    }
    Ok(parts.join("/"))
}

pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

pub struct Uploader {
    remote: Box<dyn Remote>,
    retry: RetryPolicy,
}

impl Uploader {
    pub fn new(remote: Box<dyn Remote>) -> Uploader {
        Uploader {
            remote,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Uploader {
        self.retry = retry;
        self
    }

    pub fn remote_name(&self) -> String {
        self.remote.name()
    }

    /// Uploads a single file. Never fails: errors end up in the outcome.
    pub async fn upload_file(&self, target: &UploadTarget) -> UploadOutcome {
        let result = match remote_key(&target.relative_path) {
            Ok(key) => self.put(target, &key).await.map(|()| key),
            Err(error) => Err(Error::from(error)),
        };
        match result {
            Ok(key) => UploadOutcome::Success {
                relative_path: target.relative_path.clone(),
                remote_key: key,
            },
            Err(error) => UploadOutcome::Failure {
                relative_path: target.relative_path.clone(),
                error,
            },
        }
    }

    async fn put(&self, target: &UploadTarget, key: &str) -> Result<(), Error> {
        let path = target.path();
        let body = fs::read(&path).await?;
        let content_type = content_type(&path);

        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(
                "Uploading {} to {} as {} (try {}/{})",
                path.display(),
                key,
                content_type,
                attempt,
                attempts
            );
            match self
                .remote
                .put_object(key, body.clone(), &content_type)
                .await
            {
                Ok(()) => return Ok(()),
                Err(error) if attempt < attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "Upload of {} failed: {}. Retrying in {:?}",
                        target.relative_path.display(),
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}
