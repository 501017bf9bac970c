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

use std::env;
use std::path::PathBuf;

use deploy_assets::config::Config;
use deploy_assets::deploy::{Deploy, DeployTask};
use deploy_assets::progress::{self, Progress};
use deploy_assets::uploader::Uploader;

use deploy_assets::remotes::aws::AwsBucket;
use deploy_assets::remotes::localhost::Localhost;
use deploy_assets::remotes::remote::Remote;

use log::*;
use structopt::StructOpt;

use tokio::sync::mpsc;

#[derive(StructOpt, Debug)]
#[structopt()]
struct Opt {
    /// Silence all output
    #[structopt(short = "q", long = "quiet")]
    quiet: bool,
    /// Verbose mode (-v, -vv, -vvv, etc)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,
    /// Configuration file. Defaults to $CONF_FILE, then config.toml
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: Option<PathBuf>,
    /// Directory containing the build output, overrides deploy.dist_dir
    #[structopt(long = "dist-dir")]
    dist_dir: Option<String>,
    /// Exit successfully even if some uploads failed
    #[structopt(long = "allow-partial")]
    allow_partial: bool,
}

#[tokio::main]
async fn main() -> Result<(), i32> {
    let opt = Opt::from_args();
    stderrlog::new()
        .module(module_path!())
        .quiet(opt.quiet)
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .unwrap();

    let path = match opt.config {
        Some(path) => path,
        None => match env::var("CONF_FILE") {
            Ok(x) => PathBuf::from(x),
            Err(_) => PathBuf::from("config.toml"),
        },
    };

    if !path.exists() {
        error!("The configuration file {:?} doesn't exist.", path);
        return Err(-1);
    }

    let mut config = match Config::new(&path).await {
        Ok(config) => config,
        Err(error) => {
            error!("Config error: {}", error);
            return Err(-1);
        }
    };
    if opt.dist_dir.is_some() {
        config.deploy.dist_dir = opt.dist_dir;
    }

    let remote: Box<dyn Remote> = match (config.aws, config.localhost) {
        (Some(aws), _) => {
            info!("Remote aws.{} configured", aws.bucket);
            Box::new(AwsBucket::new(aws).await)
        }
        (None, Some(localhost)) => match Localhost::new(localhost) {
            Ok(localhost) => {
                info!("Remote localhost.{} configured", localhost.name());
                Box::new(localhost)
            }
            Err(error) => {
                error!("Localhost remote error: {}", error);
                return Err(-1);
            }
        },
        (None, None) => {
            error!("No remote configured.");
            return Err(-1);
        }
    };

    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(error) => {
            error!("Unable to read the current directory: {}", error);
            return Err(-1);
        }
    };
    let task = DeployTask::new(&config.deploy.dist_dir(&cwd), config.deploy.pattern());

    let (tx, rx) = mpsc::unbounded_channel::<Progress>();
    // --quiet silences the progress lines too
    let printer = tokio::spawn(progress::print(rx, opt.quiet));

    let uploader = Uploader::new(remote).with_retry(config.deploy.retry_policy());
    let deploy = Deploy::new(
        uploader,
        config.deploy.concurrency(),
        tx,
        config.deploy.next_step(),
    );

    let result = task.run(&deploy).await;
    // Closes the channel: the printer exits once everything is on screen
    drop(deploy);
    if printer.await.is_err() {
        warn!("Progress printer stopped unexpectedly");
    }

    let result = match result {
        Ok(result) => result,
        Err(error) => {
            error!("{}", error);
            return Err(-1);
        }
    };

    if result.has_failures() {
        if opt.allow_partial {
            warn!(
                "{} of {} uploads failed, ignored because of --allow-partial",
                result.failed(),
                result.outcomes.len()
            );
        } else {
            error!(
                "{} of {} uploads failed",
                result.failed(),
                result.outcomes.len()
            );
            return Err(-1);
        }
    }
    Ok(())
}
