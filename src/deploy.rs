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

use crate::assets::{self, Assets};
use crate::progress::Progress;
use crate::uploader::{UploadOutcome, UploadTarget, Uploader};

use std::fmt;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};

use log::{debug, info, warn};

use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug)]
pub enum Error {
    MissingDistDir(String),
    NoAssets,
    Assets(assets::Error),
}

impl From<assets::Error> for Error {
    fn from(error: assets::Error) -> Self {
        Error::Assets(error)
    }
}

impl std::error::Error for Error {}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingDistDir(dir) => write!(
                f,
                "Unable to find dist directory [{}/]. Ensure the build step has run.",
                dir
            ),
            Error::NoAssets => write!(f, "There are no assets to deploy."),
            Error::Assets(error) => write!(f, "{}", error),
        }
    }
}

/// How many uploads of a batch may be in flight at the same time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Concurrency {
    Unbounded,
    Bounded(usize),
}

impl Concurrency {
    fn limit(&self, total: usize) -> usize {
        match self {
            Concurrency::Unbounded => total.max(1),
            Concurrency::Bounded(limit) => (*limit).max(1),
        }
    }
}

/// Every outcome of a batch, one per file.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<UploadOutcome>,
}

impl BatchResult {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|outcome| !outcome.is_success())
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Uploads a set of files concurrently. A failed upload is reported and
/// recorded but never stops the others.
pub struct Deploy {
    uploader: Uploader,
    concurrency: Concurrency,
    progress: UnboundedSender<Progress>,
    next_step: String,
}

impl Deploy {
    pub fn new(
        uploader: Uploader,
        concurrency: Concurrency,
        progress: UnboundedSender<Progress>,
        next_step: &str,
    ) -> Deploy {
        Deploy {
            uploader,
            concurrency,
            progress,
            next_step: String::from(next_step),
        }
    }

    fn report(&self, message: Progress) {
        if self.progress.send(message).is_err() {
            warn!("Progress receiver dropped, message lost");
        }
    }

    fn report_outcome(&self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Success {
                relative_path,
                remote_key,
            } => {
                info!(
                    "Uploaded {} to [{}] {}",
                    relative_path.display(),
                    self.uploader.remote_name(),
                    remote_key
                );
                self.report(Progress::Uploaded {
                    relative_path: relative_path.clone(),
                    remote_key: remote_key.clone(),
                });
            }
            UploadOutcome::Failure {
                relative_path,
                error: upload_error,
            } => {
                // the progress line is what the operator sees
                debug!(
                    "Error during upload of {}. Error: {}",
                    relative_path.display(),
                    upload_error
                );
                self.report(Progress::Failed {
                    relative_path: relative_path.clone(),
                    error: upload_error.to_string(),
                });
            }
        }
    }

    /// Uploads every `relative_paths` entry found under `root` and waits for
    /// all of them. Outcomes are reported as they settle, the closing message
    /// only once the last one did.
    pub async fn run(&self, root: &Path, relative_paths: &[PathBuf]) -> BatchResult {
        let total = relative_paths.len();
        info!(
            "Uploading {} files from {} to {}",
            total,
            root.display(),
            self.uploader.remote_name()
        );

        let outcomes = stream::iter(relative_paths)
            .map(|relative_path| {
                let target = UploadTarget::new(root, relative_path);
                async move {
                    let outcome = self.uploader.upload_file(&target).await;
                    self.report_outcome(&outcome);
                    outcome
                }
            })
            .buffer_unordered(self.concurrency.limit(total))
            .collect::<Vec<UploadOutcome>>()
            .await;

        let result = BatchResult { outcomes };
        info!(
            "Batch completed: {} uploaded, {} failed",
            result.succeeded(),
            result.failed()
        );
        self.report(Progress::Finished(self.next_step.clone()));
        result
    }
}

/// The whole deploy: checks the dist directory, finds the assets in it and
/// uploads them.
pub struct DeployTask {
    pub dist_dir: PathBuf,
    pub pattern: String,
}

impl DeployTask {
    pub fn new(dist_dir: &Path, pattern: &str) -> DeployTask {
        DeployTask {
            dist_dir: dist_dir.to_path_buf(),
            pattern: String::from(pattern),
        }
    }

    /// The assets to upload. Fails if there is nothing to do.
    pub fn assets(&self) -> Result<Assets, Error> {
        if !self.dist_dir.is_dir() {
            let dir = self.dist_dir.display().to_string();
            return Err(Error::MissingDistDir(String::from(dir.trim_end_matches('/'))));
        }
        let assets = Assets::new(&self.dist_dir, &self.pattern)?;
        if assets.is_empty() {
            return Err(Error::NoAssets);
        }
        Ok(assets)
    }

    pub async fn run(&self, deploy: &Deploy) -> Result<BatchResult, Error> {
        let assets = self.assets()?;
        Ok(deploy.run(&assets.root, &assets.paths).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remotes::testing::Recording;

    use std::collections::HashSet;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn dist(files: &[String]) -> tempfile::TempDir {
        let tmp_dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = tmp_dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, file).unwrap();
        }
        tmp_dir
    }

    fn deploy(remote: &Recording, concurrency: Concurrency) -> (Deploy, UnboundedReceiver<Progress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let uploader = Uploader::new(Box::new(remote.clone()));
        (Deploy::new(uploader, concurrency, tx, "next"), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Progress>) -> Vec<Progress> {
        let mut messages = vec![];
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_others() {
        let files: Vec<String> = ["a.js", "b.css", "img/c.png", "fonts/d.woff"]
            .iter()
            .map(|f| String::from(*f))
            .collect();
        let tmp_dir = dist(&files);
        let remote = Recording::new();
        remote.fail_always("b.css");
        let (deploy, mut rx) = deploy(&remote, Concurrency::Unbounded);

        let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
        let result = deploy.run(tmp_dir.path(), &paths).await;

        assert_eq!(result.outcomes.len(), 4);
        assert!(result.has_failures());
        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.failed(), 1);

        let mut keys: Vec<String> = remote.puts().into_iter().map(|(key, _)| key).collect();
        keys.sort();
        assert_eq!(keys, vec!["a.js", "fonts/d.woff", "img/c.png"]);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 5);
        let failed: Vec<&Progress> = messages
            .iter()
            .filter(|m| matches!(m, Progress::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        // the failure names the file that actually failed
        match failed[0] {
            Progress::Failed { relative_path, .. } => {
                assert_eq!(relative_path, &PathBuf::from("b.css"))
            }
            _ => unreachable!(),
        }
        assert_eq!(messages[4], Progress::Finished(String::from("next")));
    }

    #[tokio::test]
    async fn test_join_barrier_under_load() {
        let files: Vec<String> = (0..50).map(|i| format!("assets/{}.js", i)).collect();
        let tmp_dir = dist(&files);
        let remote = Recording::new();
        let (deploy, mut rx) = deploy(&remote, Concurrency::Unbounded);

        let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
        let result = deploy.run(tmp_dir.path(), &paths).await;

        assert_eq!(result.outcomes.len(), 50);
        assert!(!result.has_failures());
        let outcome_paths: HashSet<PathBuf> = result
            .outcomes
            .iter()
            .map(|o| o.relative_path().to_path_buf())
            .collect();
        assert_eq!(outcome_paths.len(), 50);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 51);
        assert_eq!(messages[50], Progress::Finished(String::from("next")));

        let uploaded: HashSet<String> = messages[..50]
            .iter()
            .map(|m| match m {
                Progress::Uploaded { remote_key, .. } => remote_key.clone(),
                other => panic!("unexpected message {:?}", other),
            })
            .collect();
        let expected: HashSet<String> = files.iter().cloned().collect();
        assert_eq!(uploaded, expected);
        assert_eq!(remote.total_attempts(), 50);
        // nothing waits for a slot
        assert_eq!(remote.max_in_flight(), 50);
    }

    #[tokio::test]
    async fn test_bounded() {
        let files: Vec<String> = (0..10).map(|i| format!("{}.css", i)).collect();
        let tmp_dir = dist(&files);
        let remote = Recording::new();
        remote.fail_always("3.css");
        let (deploy, mut rx) = deploy(&remote, Concurrency::Bounded(2));

        let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
        let result = deploy.run(tmp_dir.path(), &paths).await;

        assert_eq!(result.outcomes.len(), 10);
        assert_eq!(result.failed(), 1);
        assert_eq!(drain(&mut rx).len(), 11);
        assert_eq!(remote.max_in_flight(), 2);
    }

    #[test]
    fn test_concurrency_limit() {
        assert_eq!(Concurrency::Unbounded.limit(50), 50);
        assert_eq!(Concurrency::Unbounded.limit(0), 1);
        assert_eq!(Concurrency::Bounded(4).limit(50), 4);
        assert_eq!(Concurrency::Bounded(0).limit(50), 1);
    }

    #[tokio::test]
    async fn test_missing_dist_dir() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let missing = tmp_dir.path().join("dist");
        let remote = Recording::new();
        let (deploy, mut rx) = deploy(&remote, Concurrency::Unbounded);

        let task = DeployTask::new(&missing, crate::config::DEFAULT_PATTERN);
        let result = task.run(&deploy).await;
        match result {
            Err(Error::MissingDistDir(dir)) => assert_eq!(dir, missing.display().to_string()),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(
            Error::MissingDistDir(String::from("dist")).to_string(),
            "Unable to find dist directory [dist/]. Ensure the build step has run."
        );
        assert_eq!(remote.total_attempts(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_no_assets() {
        let tmp_dir = dist(&[String::from("index.html")]);
        let remote = Recording::new();
        let (deploy, mut rx) = deploy(&remote, Concurrency::Unbounded);

        let task = DeployTask::new(tmp_dir.path(), crate::config::DEFAULT_PATTERN);
        let result = task.run(&deploy).await;
        assert!(matches!(result, Err(Error::NoAssets)));
        assert_eq!(Error::NoAssets.to_string(), "There are no assets to deploy.");
        assert_eq!(remote.total_attempts(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_task_uploads_only_assets() {
        let files: Vec<String> = ["index.html", "assets/app.js", "assets/logo.svg"]
            .iter()
            .map(|f| String::from(*f))
            .collect();
        let tmp_dir = dist(&files);
        let remote = Recording::new();
        let (deploy, _rx) = deploy(&remote, Concurrency::Unbounded);

        let task = DeployTask::new(tmp_dir.path(), crate::config::DEFAULT_PATTERN);
        let result = task.run(&deploy).await.unwrap();
        assert_eq!(result.outcomes.len(), 2);

        let mut puts = remote.puts();
        puts.sort();
        assert_eq!(puts[0].0, "assets/app.js");
        assert_eq!(
            puts[1],
            (String::from("assets/logo.svg"), String::from("image/svg+xml"))
        );
    }
}
