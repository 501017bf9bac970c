// Copyright 2021 Paolo Galeone <nessuno@nerdz.eu>
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

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;

use crate::config::AwsConfig;
use crate::remotes::remote;

use async_trait::async_trait;

use log::debug;

use std::fmt;

#[derive(Debug)]
pub enum Error {
    PutError(SdkError<PutObjectError>),
}

impl From<SdkError<PutObjectError>> for Error {
    fn from(error: SdkError<PutObjectError>) -> Self {
        Error::PutError(error)
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PutError(error) => {
                write!(f, "AWS Put object error: {}", DisplayErrorContext(error))
            }
        }
    }
}

#[derive(Clone)]
pub struct AwsBucket {
    name: String,
    client: Client,
}

impl AwsBucket {
    /// Builds the S3 client from static credentials. Nothing is sent to AWS here:
    /// bad credentials or a missing bucket show up as per-file upload failures.
    pub async fn new(config: AwsConfig) -> AwsBucket {
        let credentials = Credentials::new(
            config.access_key,
            config.secret_key,
            None,
            None,
            "deploy-assets",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = config.endpoint {
            // S3-compatible stores (minio, R2, ...) usually don't do virtual hosts
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        AwsBucket {
            name: config.bucket,
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl remote::Remote for AwsBucket {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), remote::Error> {
        debug!("PUT s3://{}/{} ({})", self.name, key, content_type);
        self.client
            .put_object()
            .bucket(&self.name)
            .key(key.trim_start_matches('/'))
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}
