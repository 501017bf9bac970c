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

use async_trait::async_trait;

use std::fmt;
use std::string::String;

use crate::remotes::aws::Error as AwsError;

#[derive(Debug)]
pub enum Error {
    LocalError(std::io::Error),
    RemoteError(AwsError),
    InvalidKey(String),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::LocalError(error)
    }
}

impl From<AwsError> for Error {
    fn from(error: AwsError) -> Self {
        Error::RemoteError(error)
    }
}

impl std::error::Error for Error {}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LocalError(error) => write!(f, "Local (IO) error: {}", error),
            Error::RemoteError(error) => write!(f, "Remote error: {}", error),
            Error::InvalidKey(key) => write!(f, "Invalid object key: {}", key),
        }
    }
}

/// An object store the assets are uploaded to.
///
/// Implementations are shared read-only by every upload of a batch, hence
/// `&self` receivers and the `Send + Sync` bound.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Store `body` under `key`. A single attempt: retrying is up to the caller.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str)
        -> Result<(), Error>;

    fn name(&self) -> String;
}
