use crate::config::LocalhostConfig;
use crate::remotes::remote;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use log::debug;

use std::fmt;

use tokio::fs;

#[derive(Debug, PartialEq)]
pub enum Error {
    IsNotAbsolute(PathBuf),
    DoesNotExist(PathBuf),
    IsNotAFolder(PathBuf),
}

impl std::error::Error for Error {}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IsNotAbsolute(path) => write!(f, "Path {} is not absolute", path.display()),
            Error::DoesNotExist(path) => write!(f, "Path {} does not exist", path.display()),
            Error::IsNotAFolder(path) => write!(f, "Path {} is not a folder", path.display()),
        }
    }
}

/// A "bucket" that is just a folder on this machine. Objects land in
/// `<path>/<key>`; the content type is not stored.
#[derive(Clone)]
pub struct Localhost {
    name: String,
    path: PathBuf,
}

impl Localhost {
    pub fn new(config: LocalhostConfig) -> Result<Localhost, Error> {
        let path = PathBuf::from(config.path);

        if path.is_relative() {
            return Err(Error::IsNotAbsolute(path));
        }
        if !path.exists() {
            return Err(Error::DoesNotExist(path));
        }
        if !path.is_dir() {
            return Err(Error::IsNotAFolder(path));
        }

        Ok(Localhost {
            name: path.display().to_string(),
            path,
        })
    }

    fn destination(&self, key: &str) -> Result<PathBuf, remote::Error> {
        let key = Path::new(key.trim_start_matches('/'));
        // Keys must stay inside the folder
        let escapes = key
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || key.as_os_str().is_empty() {
            return Err(remote::Error::InvalidKey(key.display().to_string()));
        }
        Ok(self.path.join(key))
    }
}

#[async_trait]
impl remote::Remote for Localhost {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), remote::Error> {
        let dest = self.destination(key)?;
        if let Some(parent) = dest.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        debug!("Writing {} ({})", dest.display(), content_type);
        fs::write(dest, body).await?;
        Ok(())
    }
}
