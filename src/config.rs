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

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::string::String;
use std::time::Duration;

use std::fmt;

use tokio::fs;

use crate::deploy::Concurrency;
use crate::uploader::RetryPolicy;

pub const DEFAULT_DIST_DIR: &str = "dist";
pub const DEFAULT_PATTERN: &str = "**/*.{js,css,png,gif,jpg,ttf,svg,eot,woff}";
pub const DEFAULT_NEXT_STEP: &str =
    "To publish this revision, deploy index.html now that its assets are in place.";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AwsConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub endpoint: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LocalhostConfig {
    pub path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DeployConfig {
    pub dist_dir: Option<String>,
    pub pattern: Option<String>,
    pub concurrency: Option<usize>,
    pub attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub next_step: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    // remotes
    pub aws: Option<AwsConfig>,
    pub localhost: Option<LocalhostConfig>,
    // what and how
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Debug)]
pub enum Error {
    Open(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::error::Error for Error {}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open(error) => write!(f, "Could not open/read config: {}", error),
            Error::Parse(error) => write!(f, "Failed to parse config: {}", error),
            Error::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Open(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Parse(error)
    }
}

impl Config {
    pub async fn new(path: &Path) -> Result<Config, Error> {
        let txt = fs::read_to_string(path).await?;
        Config::parse(&txt)
    }

    pub fn parse(txt: &str) -> Result<Config, Error> {
        let config: Config = toml::from_str(txt)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        match (&self.aws, &self.localhost) {
            (Some(_), Some(_)) => {
                return Err(Error::Invalid(String::from(
                    "both [aws] and [localhost] are configured, pick one remote",
                )))
            }
            (None, None) => {
                return Err(Error::Invalid(String::from(
                    "no remote configured, add an [aws] or [localhost] section",
                )))
            }
            _ => {}
        }
        if self.deploy.concurrency == Some(0) {
            return Err(Error::Invalid(String::from(
                "deploy.concurrency must be greater than zero",
            )));
        }
        if self.deploy.attempts == Some(0) {
            return Err(Error::Invalid(String::from(
                "deploy.attempts must be greater than zero",
            )));
        }
        Ok(())
    }
}

impl DeployConfig {
    /// The dist directory, with `~` and environment variables expanded.
    /// Relative paths are resolved against `root`.
    pub fn dist_dir(&self, root: &Path) -> PathBuf {
        let dist_dir = self.dist_dir.as_deref().unwrap_or(DEFAULT_DIST_DIR);
        let expanded = shellexpand::full(dist_dir)
            .map(|expanded| expanded.into_owned())
            .unwrap_or_else(|_| String::from(dist_dir));
        root.join(expanded)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or(DEFAULT_PATTERN)
    }

    pub fn concurrency(&self) -> Concurrency {
        match self.concurrency {
            Some(limit) => Concurrency::Bounded(limit),
            None => Concurrency::Unbounded,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            attempts: self.attempts.unwrap_or(default.attempts),
            backoff: self
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default.backoff),
        }
    }

    pub fn next_step(&self) -> &str {
        self.next_step.as_deref().unwrap_or(DEFAULT_NEXT_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aws() {
        let config = Config::parse(
            r#"
            [aws]
            region = "eu-west-1"
            access_key = "key"
            secret_key = "secret"
            bucket = "assets"

            [deploy]
            dist_dir = "build"
            concurrency = 8
            attempts = 3
            backoff_ms = 250
            "#,
        )
        .unwrap();

        let aws = config.aws.unwrap();
        assert_eq!(aws.bucket, "assets");
        assert_eq!(aws.region, "eu-west-1");
        assert!(aws.endpoint.is_none());
        assert!(config.localhost.is_none());

        assert_eq!(
            config.deploy.dist_dir(Path::new("/project")),
            PathBuf::from("/project/build")
        );
        assert_eq!(config.deploy.concurrency(), Concurrency::Bounded(8));
        assert_eq!(
            config.deploy.retry_policy(),
            RetryPolicy {
                attempts: 3,
                backoff: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse(
            r#"
            [localhost]
            path = "/tmp/bucket"
            "#,
        )
        .unwrap();

        assert_eq!(config.deploy, DeployConfig::default());
        assert_eq!(config.deploy.pattern(), DEFAULT_PATTERN);
        assert_eq!(config.deploy.next_step(), DEFAULT_NEXT_STEP);
        assert_eq!(config.deploy.concurrency(), Concurrency::Unbounded);
        assert_eq!(config.deploy.retry_policy(), RetryPolicy::default());
        assert_eq!(
            config.deploy.dist_dir(Path::new("/project")),
            PathBuf::from("/project/dist")
        );
    }

    #[test]
    fn test_absolute_dist_dir() {
        let deploy = DeployConfig {
            dist_dir: Some(String::from("/srv/www/dist")),
            ..Default::default()
        };
        assert_eq!(
            deploy.dist_dir(Path::new("/project")),
            PathBuf::from("/srv/www/dist")
        );
    }

    #[test]
    fn test_invalid() {
        let no_remote = Config::parse("[deploy]\ndist_dir = \"dist\"\n");
        assert!(matches!(no_remote, Err(Error::Invalid(_))));

        let both = Config::parse(
            r#"
            [localhost]
            path = "/tmp/bucket"
            [aws]
            region = "eu-west-1"
            access_key = "key"
            secret_key = "secret"
            bucket = "assets"
            "#,
        );
        assert!(matches!(both, Err(Error::Invalid(_))));

        let zero = Config::parse(
            r#"
            [localhost]
            path = "/tmp/bucket"
            [deploy]
            concurrency = 0
            "#,
        );
        assert!(matches!(zero, Err(Error::Invalid(_))));

        let no_attempts = Config::parse(
            r#"
            [localhost]
            path = "/tmp/bucket"
            [deploy]
            attempts = 0
            "#,
        );
        assert!(matches!(no_attempts, Err(Error::Invalid(_))));

        let garbage = Config::parse("[aws\n");
        assert!(matches!(garbage, Err(Error::Parse(_))));
    }
}
