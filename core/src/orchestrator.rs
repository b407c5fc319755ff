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
//! Implements the verbs a CLI invocation dispatches: `create`, `start`,
//! `stop`, `destroy`, `nat`, `denat`, `login`, `backup`, `restore`,
//! `download`, `upload`, and the RPC fallback for `exec`/unknown verbs.
//! Ties together the registry, resolver, action stack, engine client
//! and NAT client.
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use chrono::Local;
use regex::Regex;

use crate::engine::{ContainerStatus, EngineClient};
use crate::error::SergioError;
use crate::model::MergedContainer;
use crate::nat::NatClient;
use crate::output::OutputMode;
use crate::registry::Registry;
use crate::resolver::resolve_order;
use crate::stack::ExecContext;

const QUIESCENCE_DELAY: Duration = Duration::from_secs(5);

pub struct Orchestrator<'a> {
    pub registry: &'a Registry,
    pub engine: &'a dyn EngineClient,
    pub nat_v4: &'a dyn NatClient,
    pub nat_v6: &'a dyn NatClient,
    pub config_dir: &'a Path,
    pub definitions_dir: &'a Path,
    pub backups_dir: &'a Path,
    pub output: OutputMode,
}

impl<'a> Orchestrator<'a> {
    pub fn create(&self, id: &str, recursive: bool) -> Result<(), SergioError> {
        if self.engine.exists(id)? {
            return Err(SergioError::AlreadyExists(id.to_string()));
        }
        let container = self.registry.get(id)?;
        let order = resolve_order(self.registry, id)?;
        self.check_requirements(&order, recursive, recursive)?;

        self.engine.launch(&container.image, id)
            .map_err(|_| SergioError::LaunchFailed(id.to_string()))?;
        for (name, mountpoint) in &container.mountpoints {
            self.engine.add_mount(id, name, &mountpoint.source, &mountpoint.path)?;
        }
        sleep(QUIESCENCE_DELAY);
        self.nat(id)?;
        self.run_named_action(&container, "create", HashMap::new())?;
        self.run_named_action(&container, "start", HashMap::new())?;
        Ok(())
    }

    pub fn start(&self, id: &str, recursive: bool) -> Result<(), SergioError> {
        if matches!(self.engine.status(id)?, ContainerStatus::Running) {
            if self.output.emits_log() {
                info!("[{id}] already running");
            }
            return Ok(());
        }
        let container = self.registry.get(id)?;
        let order = resolve_order(self.registry, id)?;
        self.check_requirements(&order, recursive, false)?;
        self.engine.start(id)?;
        sleep(QUIESCENCE_DELAY);
        self.nat(id)?;
        self.run_named_action(&container, "start", HashMap::new())?;
        Ok(())
    }

    pub fn stop(&self, id: &str) -> Result<(), SergioError> {
        if !matches!(self.engine.status(id)?, ContainerStatus::Running) {
            return Ok(());
        }
        let container = self.registry.get(id)?;
        self.run_named_action(&container, "stop", HashMap::new())?;
        self.denat(id)?;
        self.engine.stop(id)?;
        Ok(())
    }

    /// Every step before the final delete is best-effort: a failure
    /// there is logged and swallowed so a half-broken container can
    /// still be torn down.
    pub fn destroy(&self, id: &str) -> Result<(), SergioError> {
        let teardown: Result<(), SergioError> = (|| {
            let container = self.registry.get(id)?;
            let running = matches!(self.engine.status(id)?, ContainerStatus::Running);
            if container.actions.contains_key("destroy") && !running {
                self.start(id, true)?;
            }
            if matches!(self.engine.status(id)?, ContainerStatus::Running) {
                self.run_named_action(&container, "stop", HashMap::new())?;
                self.denat(id)?;
                self.engine.stop(id)?;
            }
            self.run_named_action(&container, "destroy", HashMap::new())?;
            Ok(())
        })();
        if let Err(error) = teardown {
            if self.output.emits_log() {
                error!("[{id}] error during teardown, deleting anyway: {error}");
            }
        }
        self.engine.delete(id, true)
    }

    pub fn running(&self, id: &str) -> Result<bool, SergioError> {
        Ok(matches!(self.engine.status(id)?, ContainerStatus::Running))
    }

    pub fn nat(&self, id: &str) -> Result<(), SergioError> {
        if !matches!(self.engine.status(id)?, ContainerStatus::Running) {
            return Ok(());
        }
        let container = self.registry.get(id)?;
        for port in &container.ports {
            let comment = port.comment.clone().unwrap_or_else(|| container.name.clone());

            self.nat_v4.remove_forward(port.to)?;
            let address_v4 = self.resolve_ip(&container, port.device.as_deref(), 4)?;
            self.nat_v4.add_forward(&port.protocol, port.to, port.from, &address_v4, &comment)?;

            self.nat_v6.remove_forward(port.to)?;
            let address_v6 = self.resolve_ip(&container, port.device.as_deref(), 6)?;
            self.nat_v6.add_forward(&port.protocol, port.to, port.from, &format!("[{address_v6}]"), &comment)?;
        }
        Ok(())
    }

    pub fn denat(&self, id: &str) -> Result<(), SergioError> {
        let container = self.registry.get(id)?;
        for port in &container.ports {
            self.nat_v4.remove_forward(port.to)?;
            self.nat_v6.remove_forward(port.to)?;
        }
        Ok(())
    }

    pub fn login(&self, id: &str, dir: Option<String>) -> Result<(), SergioError> {
        if !matches!(self.engine.status(id)?, ContainerStatus::Running) {
            if self.output.emits_log() {
                info!("[{id}] not running");
            }
            return Ok(());
        }
        let container = self.registry.get(id)?;
        if let Some(dir) = dir {
            container.set_workdir(dir);
        }
        let code = match container.current_workdir() {
            Some(workdir) => {
                let code = format!("cd {workdir}; exec {}", container.shell);
                self.engine.interactive_shell(id, &container.user, &container.shell, Some(&code))?
            }
            None => self.engine.interactive_shell(id, &container.user, &container.shell, None)?,
        };
        if code != 0 && self.output.emits_log() {
            debug!("[{id}] interactive shell exited with {code}");
        }
        Ok(())
    }

    pub fn backup(&self, id: &str) -> Result<(), SergioError> {
        let container = self.registry.get(id)?;
        if !container.actions.contains_key("backup") {
            return Err(SergioError::RequiredActionMissing {
                container: id.to_string(), action: "backup".to_string(),
            });
        }
        if !matches!(self.engine.status(id)?, ContainerStatus::Running) && self.output.emits_log() {
            info!("[{id}] not running");
        }
        self.run_named_action(&container, "backup", HashMap::new())?;

        let data = self.engine.files_get(id, "/tmp/backup.zip")?;
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let filename = format!("{id}_{timestamp}.zip");
        std::fs::create_dir_all(self.backups_dir)?;
        std::fs::write(self.backups_dir.join(&filename), &data)?;
        self.engine.files_delete(id, "/tmp/backup.zip")?;

        let latest = self.backups_dir.join(format!("{id}_latest.zip"));
        let _ = std::fs::remove_file(&latest);
        symlink_latest(&filename, &latest)?;
        Ok(())
    }

    pub fn restore(&self, id: &str, path: Option<String>) -> Result<(), SergioError> {
        let container = self.registry.get(id)?;
        if !container.actions.contains_key("restore") {
            return Err(SergioError::RequiredActionMissing {
                container: id.to_string(), action: "restore".to_string(),
            });
        }
        if !matches!(self.engine.status(id)?, ContainerStatus::Running) && self.output.emits_log() {
            info!("[{id}] not running");
        }

        let chosen = match self.find_backup_candidate(id, path.as_deref()) {
            Some(path) => path,
            None => {
                if self.output.emits_log() {
                    info!("[{id}] no backup found to restore");
                }
                return Ok(());
            }
        };

        let data = std::fs::read(&chosen)?;
        self.engine.files_put(id, "/tmp/backup.zip", &data, "0644")?;
        if let Err(error) = self.run_named_action(&container, "restore", HashMap::new()) {
            if self.output.emits_log() {
                error!("[{id}] restore action failed: {error}");
            }
        }
        self.engine.files_delete(id, "/tmp/backup.zip")?;
        Ok(())
    }

    pub fn download(&self, id: &str, src: &str, dst: &str) -> Result<(), SergioError> {
        let data = self.engine.files_get(id, src)?;
        if dst == "-" {
            std::io::stdout().write_all(&data)?;
        } else {
            std::fs::write(dst, &data)?;
        }
        Ok(())
    }

    pub fn upload(&self, id: &str, src: &str, dst: &str) -> Result<(), SergioError> {
        let container = self.registry.get(id)?;
        let data = if src == "-" {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        } else {
            std::fs::read(src)?
        };
        self.engine.files_put(id, dst, &data, "0644")?;
        let owner = format!("{user}:{user}", user = container.user);
        let argv = vec!["chown".to_string(), owner, dst.to_string()];
        self.engine.execute(id, &argv, OutputMode::None)?;
        Ok(())
    }

    /// `exec` and any verb that isn't one of the built-ins become an
    /// ad-hoc RPC targeting the named container's own action stack.
    pub fn exec_or_rpc(&self, id: &str, verb: &str, mut params: HashMap<String, String>) -> Result<(), SergioError> {
        let container = self.registry.get(id)?;
        params.insert("caller".to_string(), id.to_string());
        self.run_named_action(&container, verb, params)
    }

    fn run_named_action(
        &self, container: &MergedContainer, name: &str, params: HashMap<String, String>
    ) -> Result<(), SergioError> {
        match container.actions.get(name) {
            Some(stack) => {
                let ctx = ExecContext {
                    registry: self.registry,
                    engine: self.engine,
                    container,
                    rpc_vars: if params.is_empty() { None } else { Some(&params) },
                    config_dir: self.config_dir,
                    definitions_dir: self.definitions_dir,
                    output: self.output,
                };
                stack.execute(&ctx, name)
            }
            None => {
                if self.output.emits_log() {
                    debug!("[{}] action '{}' not defined, skipping", container.id, name);
                }
                Ok(())
            }
        }
    }

    fn check_requirements(&self, order: &[String], can_start: bool, can_create: bool) -> Result<(), SergioError> {
        for id in order {
            if !self.engine.exists(id)? {
                if can_create {
                    self.create_or_start(id, true)?;
                } else {
                    return Err(SergioError::RequirementsNotMet(id.clone()));
                }
            } else if !matches!(self.engine.status(id)?, ContainerStatus::Running) {
                if can_start {
                    self.start(id, true)?;
                } else {
                    return Err(SergioError::RequirementsNotMet(id.clone()));
                }
            }
        }
        Ok(())
    }

    fn create_or_start(&self, id: &str, recursive: bool) -> Result<(), SergioError> {
        if self.engine.exists(id)? {
            self.start(id, recursive)
        } else {
            self.create(id, recursive)
        }
    }

    fn resolve_ip(&self, container: &MergedContainer, device: Option<&str>, family: u8) -> Result<String, SergioError> {
        let cache_key = device.unwrap_or("*");
        if let Some(cached) = container.cached_ip(cache_key, family) {
            return Ok(cached);
        }
        let state = self.engine.network_state(&container.id)?;
        let matches_family = |tag: &str| match family {
            6 => tag == "inet6",
            _ => tag == "inet" || tag == "inet4",
        };
        let address = match device {
            Some(name) => {
                let (_, addresses) = state.iter().find(|(dev, _)| dev == name)
                    .ok_or_else(|| SergioError::NoSuchDevice { container: container.id.clone(), device: name.to_string() })?;
                addresses.iter().find(|a| matches_family(&a.family)).map(|a| a.address.clone())
            }
            None => state.iter()
                .flat_map(|(_, addresses)| addresses.iter())
                .find(|a| matches_family(&a.family))
                .map(|a| a.address.clone()),
        };
        let address = address.ok_or_else(|| SergioError::NoSuchDevice {
            container: container.id.clone(),
            device: device.unwrap_or("<any>").to_string(),
        })?;
        container.cache_ip(cache_key, family, address.clone());
        Ok(address)
    }

    fn find_backup_candidate(&self, id: &str, path: Option<&str>) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(p) = path {
            candidates.push(PathBuf::from(".").join(p));
            candidates.push(self.backups_dir.join(p));
        }
        candidates.push(self.backups_dir.join(format!("{id}_latest.zip")));

        let pattern = Regex::new(&format!(
            r"^{}_[0-9]{{4}}([-_][0-9]{{2}}){{5}}\.zip$", regex::escape(id)
        )).expect("static backup filename pattern");
        let mut dated: Vec<PathBuf> = std::fs::read_dir(self.backups_dir)
            .map(|entries| entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| pattern.is_match(name))
                .map(|name| self.backups_dir.join(name))
                .collect())
            .unwrap_or_default();
        dated.sort();
        dated.reverse();
        candidates.extend(dated);

        candidates.into_iter().find(|candidate| candidate.exists())
    }
}

#[cfg(unix)]
fn symlink_latest(target: &str, link: &Path) -> Result<(), SergioError> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink_latest(target: &str, link: &Path) -> Result<(), SergioError> {
    let source = link.parent().map(|dir| dir.join(target)).unwrap_or_else(|| PathBuf::from(target));
    std::fs::copy(source, link)?;
    Ok(())
}
