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
use std::path::PathBuf;

use colored::Colorize;

use tokio::sync::mpsc::UnboundedReceiver;

/// Messages the deploy sends to the operator while it runs.
#[derive(Clone, Debug, PartialEq)]
pub enum Progress {
    Uploaded {
        relative_path: PathBuf,
        remote_key: String,
    },
    Failed {
        relative_path: PathBuf,
        error: String,
    },
    // every upload settled; the value is what to do next
    Finished(String),
}

impl Progress {
    /// The message as a terminal line, coloured by kind.
    pub fn colored(&self) -> String {
        match self {
            Progress::Uploaded { .. } => self.to_string().green().to_string(),
            Progress::Failed { .. } => self.to_string().red().to_string(),
            Progress::Finished(_) => self.to_string().bold().to_string(),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Uploaded {
                relative_path,
                remote_key,
            } => write!(
                f,
                "Successfully uploaded: {} -> {}",
                relative_path.display(),
                remote_key
            ),
            Progress::Failed {
                relative_path,
                error,
            } => write!(f, "Upload failed: {}: {}", relative_path.display(), error),
            Progress::Finished(next_step) => write!(f, "{}", next_step),
        }
    }
}

/// Prints every message to stdout until all senders are gone. With `quiet`
/// the messages are only drained. Returns the number of printed lines.
pub async fn print(mut receiver: UnboundedReceiver<Progress>, quiet: bool) -> usize {
    let mut printed = 0;
    while let Some(message) = receiver.recv().await {
        if !quiet {
            println!("{}", message.colored());
            printed += 1;
        }
    }
    printed
}
