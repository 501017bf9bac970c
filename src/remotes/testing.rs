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

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::remotes::remote;

#[derive(Default)]
struct State {
    puts: Vec<(String, String)>,
    attempts: HashMap<String, usize>,
    // key -> number of attempts that fail before succeeding (usize::MAX: always)
    failures: HashMap<String, usize>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory remote for the tests: records every put and fails on demand.
#[derive(Clone, Default)]
pub struct Recording {
    state: Arc<Mutex<State>>,
}

impl Recording {
    pub fn new() -> Recording {
        Recording::default()
    }

    pub fn fail_always(&self, key: &str) {
        self.fail_times(key, usize::MAX);
    }

    pub fn fail_times(&self, key: &str, times: usize) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(String::from(key), times);
    }

    /// Successful puts, as (key, content type).
    pub fn puts(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().puts.clone()
    }

    pub fn attempts(&self, key: &str) -> usize {
        let state = self.state.lock().unwrap();
        *state.attempts.get(key).unwrap_or(&0)
    }

    pub fn total_attempts(&self) -> usize {
        self.state.lock().unwrap().attempts.values().sum()
    }

    /// Highest number of puts that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl remote::Remote for Recording {
    fn name(&self) -> String {
        String::from("recording")
    }

    async fn put_object(
        &self,
        key: &str,
        _body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), remote::Error> {
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        // Long enough for the other uploads of the batch to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        let attempt = {
            let counter = state.attempts.entry(String::from(key)).or_insert(0);
            *counter += 1;
            *counter
        };
        let fail_for = *state.failures.get(key).unwrap_or(&0);
        if attempt <= fail_for {
            return Err(remote::Error::LocalError(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("injected failure for {}", key),
            )));
        }
        state
            .puts
            .push((String::from(key), String::from(content_type)));
        Ok(())
    }
}
