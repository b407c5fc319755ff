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
//! The abstract contract the core needs from the container engine. This
//! module also ships the one concrete implementation, a thin wrapper
//! around the `lxc` command line client, built the same way
//! `podman-pilot::podman` shells out to `podman`: build a [Command],
//! run it through [CommandExtTrait::perform], map failures to
//! [SergioError::CommandError].
use std::io::{self, Write};
use std::process::{Command, Stdio};

use crate::command::CommandExtTrait;
use crate::error::SergioError;
use crate::lookup::Lookup;
use crate::output::OutputMode;
use crate::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Stopped,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct NetAddress {
    pub family: String,
    pub address: String,
}

/// The core's view of the container engine. A real implementation talks
/// to LXD; tests substitute an in-memory fake.
pub trait EngineClient {
    fn exists(&self, id: &str) -> Result<bool, SergioError>;
    fn status(&self, id: &str) -> Result<ContainerStatus, SergioError>;
    fn launch(&self, image: &str, id: &str) -> Result<(), SergioError>;
    fn start(&self, id: &str) -> Result<(), SergioError>;
    fn stop(&self, id: &str) -> Result<(), SergioError>;
    fn delete(&self, id: &str, force: bool) -> Result<(), SergioError>;
    fn add_mount(&self, id: &str, name: &str, source: &str, path: &str) -> Result<(), SergioError>;
    fn network_state(&self, id: &str) -> Result<Vec<(String, Vec<NetAddress>)>, SergioError>;
    /// Non-interactive in-container command, returns the exit code only.
    fn execute(&self, id: &str, argv: &[String], output: OutputMode) -> Result<i32, SergioError>;
    fn files_get(&self, id: &str, path: &str) -> Result<Vec<u8>, SergioError>;
    fn files_put(&self, id: &str, path: &str, data: &[u8], mode: &str) -> Result<(), SergioError>;
    /// Missing file is not an error.
    fn files_delete(&self, id: &str, path: &str) -> Result<(), SergioError>;
    /// Interactive TTY session: `lxc exec ID -- sudo --login --user U SHELL [-c CODE]`.
    fn interactive_shell(
        &self, id: &str, user: &str, shell: &str, code: Option<&str>
    ) -> Result<i32, SergioError>;
}

pub struct LxdClient;

impl LxdClient {
    pub fn new() -> Self {
        Self
    }

    fn lxc(&self) -> Command {
        User::ROOT.run("lxc")
    }
}

impl Default for LxdClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineClient for LxdClient {
    fn exists(&self, id: &str) -> Result<bool, SergioError> {
        Ok(!matches!(self.status(id)?, ContainerStatus::NotFound))
    }

    fn status(&self, id: &str) -> Result<ContainerStatus, SergioError> {
        let mut call = self.lxc();
        call.arg("info").arg(id);
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        let output = call.output()?;
        if !output.status.success() {
            return Ok(ContainerStatus::NotFound);
        }
        let info = String::from_utf8_lossy(&output.stdout);
        if info.lines().any(|line| line.trim_start().starts_with("Status: RUNNING")) {
            Ok(ContainerStatus::Running)
        } else {
            Ok(ContainerStatus::Stopped)
        }
    }

    fn launch(&self, image: &str, id: &str) -> Result<(), SergioError> {
        let mut call = self.lxc();
        call.arg("launch").arg(image).arg(id);
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        call.perform()?;
        Ok(())
    }

    fn start(&self, id: &str) -> Result<(), SergioError> {
        let mut call = self.lxc();
        call.arg("start").arg(id);
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        call.perform()?;
        Ok(())
    }

    fn stop(&self, id: &str) -> Result<(), SergioError> {
        let mut call = self.lxc();
        call.arg("stop").arg(id);
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        call.perform()?;
        Ok(())
    }

    fn delete(&self, id: &str, force: bool) -> Result<(), SergioError> {
        let mut call = self.lxc();
        call.arg("delete");
        if force {
            call.arg("--force");
        }
        call.arg(id);
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        call.perform()?;
        Ok(())
    }

    fn add_mount(&self, id: &str, name: &str, source: &str, path: &str) -> Result<(), SergioError> {
        let mut call = self.lxc();
        call.arg("config").arg("device").arg("add").arg(id).arg(name)
            .arg("disk").arg(format!("source={source}")).arg(format!("path={path}"));
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        call.perform()?;
        Ok(())
    }

    fn network_state(&self, id: &str) -> Result<Vec<(String, Vec<NetAddress>)>, SergioError> {
        let mut call = self.lxc();
        call.arg("query").arg(format!("/1.0/instances/{id}/state"));
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        let output = call.perform()?;
        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|error| SergioError::ParseError {
                path: format!("lxc query state for {id}"),
                message: error.to_string(),
            })?;
        let mut result = Vec::new();
        if let Some(network) = value.get("network").and_then(|v| v.as_object()) {
            for (device, data) in network {
                let mut addresses = Vec::new();
                if let Some(addrs) = data.get("addresses").and_then(|v| v.as_array()) {
                    for addr in addrs {
                        let family = addr.get("family").and_then(|v| v.as_str()).unwrap_or("").to_string();
                        let address = addr.get("address").and_then(|v| v.as_str()).unwrap_or("").to_string();
                        addresses.push(NetAddress { family, address });
                    }
                }
                result.push((device.clone(), addresses));
            }
        }
        Ok(result)
    }

    fn execute(&self, id: &str, argv: &[String], output: OutputMode) -> Result<i32, SergioError> {
        let mut call = self.lxc();
        call.arg("exec").arg(id).arg("--");
        for arg in argv {
            call.arg(arg);
        }
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        let result = call.output()?;
        if output.forwards_actions() {
            io::stdout().write_all(&result.stdout)?;
            io::stderr().write_all(&result.stderr)?;
        }
        Ok(result.status.code().unwrap_or(-1))
    }

    fn files_get(&self, id: &str, path: &str) -> Result<Vec<u8>, SergioError> {
        let mut call = self.lxc();
        call.arg("file").arg("pull").arg(format!("{id}{path}")).arg("-");
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        let output = call.perform()?;
        Ok(output.stdout)
    }

    fn files_put(&self, id: &str, path: &str, data: &[u8], mode: &str) -> Result<(), SergioError> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(data)?;
        let mut call = self.lxc();
        call.arg("file").arg("push")
            .arg("--mode").arg(mode)
            .arg(tmp.path())
            .arg(format!("{id}{path}"));
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        call.perform()?;
        Ok(())
    }

    fn files_delete(&self, id: &str, path: &str) -> Result<(), SergioError> {
        let mut call = self.lxc();
        call.arg("file").arg("delete").arg(format!("{id}{path}"));
        call.stdout(Stdio::null());
        call.stderr(Stdio::null());
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        // A missing file is not an error: ignore the call's own status.
        let _ = call.status();
        Ok(())
    }

    fn interactive_shell(
        &self, id: &str, user: &str, shell: &str, code: Option<&str>
    ) -> Result<i32, SergioError> {
        let mut call = self.lxc();
        call.arg("exec").arg(id).arg("--")
            .arg("sudo").arg("--login").arg("--user").arg(user).arg(shell);
        if let Some(code) = code {
            call.arg("-c").arg(code);
        }
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        let status = call.status()?;
        Ok(status.code().unwrap_or(-1))
    }
}
