//
// Copyright (c) 2023 SUSE Software Solutions Germany GmbH
//
// This file is part of flake-pilot
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
//
#[macro_use]
extern crate log;

pub mod cli;

use std::collections::HashMap;
use std::process::{ExitCode, Termination};
use std::str::FromStr;

use env_logger::Env;
use spinoff::{Color, Spinner, spinners, Streams};

use sergio_core::config::{discover_config_path, read_root_config};
use sergio_core::engine::LxdClient;
use sergio_core::error::SergioError;
use sergio_core::nat::IptablesClient;
use sergio_core::orchestrator::Orchestrator;
use sergio_core::output::OutputMode;
use sergio_core::registry::Registry;

fn main() -> ExitCode {
    setup_logger();
    let args = cli::parse_args();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            error!("{error}");
            error.report()
        }
    }
}

fn setup_logger() {
    let env = Env::default()
        .filter_or("SERGIO_LOG_LEVEL", "info")
        .write_style_or("SERGIO_LOG_STYLE", "always");
    env_logger::init_from_env(env);
}

fn run(args: cli::Cli) -> Result<ExitCode, SergioError> {
    let output = OutputMode::from_str(&args.output)
        .map_err(|message| SergioError::ParseError { path: "-o/--output".to_string(), message })?;

    let config_path = discover_config_path(args.config.as_deref(), dirs::home_dir())?;
    let config = read_root_config(&config_path)?;

    let registry = Registry::new(config.definitions_dir(), config.variables.clone());
    let engine = LxdClient::new();
    let nat_v4 = IptablesClient::v4();
    let nat_v6 = IptablesClient::v6();
    let backups_dir = config.backups_dir();
    let config_dir = config.config_dir();
    let definitions_dir = config.definitions_dir();

    let orchestrator = Orchestrator {
        registry: &registry,
        engine: &engine,
        nat_v4: &nat_v4,
        nat_v6: &nat_v6,
        config_dir: &config_dir,
        definitions_dir: &definitions_dir,
        backups_dir: &backups_dir,
        output,
    };

    let id = args.container.as_str();
    match args.verb.as_str() {
        "create" => with_spinner(output, "Launching container...", || orchestrator.create(id, args.recursive))?,
        "start" => with_spinner(output, "Starting container...", || orchestrator.start(id, args.recursive))?,
        "stop" => orchestrator.stop(id)?,
        "destroy" => orchestrator.destroy(id)?,
        "nat" => orchestrator.nat(id)?,
        "denat" => orchestrator.denat(id)?,
        "login" => orchestrator.login(id, args.params.first().cloned())?,
        "backup" => orchestrator.backup(id)?,
        "restore" => orchestrator.restore(id, args.params.first().cloned())?,
        "download" => {
            let (src, dst) = two_params(&args.params, "download")?;
            orchestrator.download(id, src, dst)?
        }
        "upload" => {
            let (src, dst) = two_params(&args.params, "upload")?;
            orchestrator.upload(id, src, dst)?
        }
        "running" => {
            return Ok(if orchestrator.running(id)? { ExitCode::SUCCESS } else { ExitCode::FAILURE });
        }
        verb => {
            let params = parse_key_values(&args.params);
            orchestrator.exec_or_rpc(id, verb, params)?
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs a blocking orchestrator step behind a spinner, mirroring the
/// "Launching flake..." spinner the podman pilot shows during its own
/// quiescence wait. Suppressed when `-o none` silences the log sink.
fn with_spinner<F>(output: OutputMode, message: &'static str, step: F) -> Result<(), SergioError>
where
    F: FnOnce() -> Result<(), SergioError>,
{
    let spinner = output.emits_log().then(|| {
        Spinner::new_with_stream(spinners::Line, message, Color::Yellow, Streams::Stderr)
    });
    match step() {
        Ok(()) => {
            if let Some(spinner) = spinner {
                spinner.success("done");
            }
            Ok(())
        }
        Err(error) => {
            if let Some(spinner) = spinner {
                spinner.fail("failed");
            }
            Err(error)
        }
    }
}

fn two_params<'a>(params: &'a [String], verb: &str) -> Result<(&'a str, &'a str), SergioError> {
    match (params.first(), params.get(1)) {
        (Some(src), Some(dst)) => Ok((src.as_str(), dst.as_str())),
        _ => Err(SergioError::ParseError {
            path: verb.to_string(),
            message: "expected <src> <dst>".to_string(),
        }),
    }
}

fn parse_key_values(params: &[String]) -> HashMap<String, String> {
    params.iter()
        .filter_map(|token| token.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
