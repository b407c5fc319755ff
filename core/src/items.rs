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
//! Handlers for the non-shell action items: RPC calls into another
//! container's own action stack, file drop/transfer/remove, workdir
//! changes and echoes. Kept apart from [crate::stack] so the frame
//! walker stays readable.
use std::collections::HashMap;

use crate::engine::ContainerStatus;
use crate::error::SergioError;
use crate::model::{FileContent, FileDropSpec, FileTransferSpec, RpcSpec, TransferDirection};
use crate::output::OutputMode;
use crate::registry::resolve_load_ref;
use crate::stack::ExecContext;

/// Parameter values are Templater-expanded against the *caller's* scope
/// before the target ever sees them, and the reserved key `caller`
/// always overlays whatever the frame itself passed.
pub fn run_rpc(spec: &RpcSpec, ctx: &ExecContext<'_, '_>) -> Result<(), SergioError> {
    let target_id = if spec.target == "self" { ctx.container.id.clone() } else { spec.target.clone() };
    let target = ctx.registry.get(&target_id)?;
    let mut params: HashMap<String, String> = spec.params.iter()
        .map(|(key, value)| (key.clone(), ctx.expand(value)))
        .collect();
    params.insert("caller".to_string(), ctx.container.id.clone());

    match target.actions.get(&spec.action) {
        Some(stack) => {
            let rpc_ctx = ctx.for_container(target.as_ref(), Some(&params));
            stack.execute(&rpc_ctx, &spec.action)
        }
        None => {
            if ctx.output.emits_log() {
                info!("[{}] action '{}' not defined, skipping", target_id, spec.action);
            }
            Ok(())
        }
    }
}

/// Looks the filename up in the container's `files` map using the raw,
/// un-expanded key. A filename built from `$variables` will therefore
/// only resolve when the definition's `files` key happens to spell out
/// the exact same placeholder text.
pub fn run_file_drop(spec: &FileDropSpec, ctx: &ExecContext<'_, '_>) -> Result<(), SergioError> {
    let content = match ctx.container.files.get(&spec.filename) {
        Some(content) => content,
        None => {
            if ctx.output.emits_log() {
                info!("[{}] no files entry for '{}', skipping", ctx.container.id, spec.filename);
            }
            return Ok(());
        }
    };
    let bytes = match content {
        FileContent::Inline(text) => ctx.expand(text).into_bytes(),
        FileContent::LoadRef(load_ref) => {
            let raw = resolve_load_ref(&load_ref.filename, ctx.config_dir, ctx.definitions_dir)?;
            if load_ref.is_bytes {
                raw
            } else {
                ctx.expand(&String::from_utf8_lossy(&raw)).into_bytes()
            }
        }
    };
    let expanded_filename = ctx.expand(&spec.filename);
    let parent = std::path::Path::new(&expanded_filename).parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty());
    if let Some(parent) = parent {
        let mkdir = vec!["mkdir".to_string(), "-p".to_string(), parent];
        ctx.engine.execute(&ctx.container.id, &mkdir, OutputMode::None)?;
    }

    let mode = spec.chmod.clone().unwrap_or_else(|| "0755".to_string());
    ctx.engine.files_put(&ctx.container.id, &expanded_filename, &bytes, &mode)?;

    let owner = spec.chown.clone()
        .unwrap_or_else(|| format!("{user}:{user}", user = ctx.container.user));
    let chown = vec!["chown".to_string(), owner, expanded_filename.clone()];
    ctx.engine.execute(&ctx.container.id, &chown, OutputMode::None)?;
    let chmod = vec!["chmod".to_string(), mode, expanded_filename];
    ctx.engine.execute(&ctx.container.id, &chmod, OutputMode::None)?;
    Ok(())
}

/// The destination's owner is the destination container's own user, but
/// the `chown` is executed against the *caller* container regardless of
/// direction — on an `up` transfer that is the wrong side.
pub fn run_file_transfer(spec: &FileTransferSpec, ctx: &ExecContext<'_, '_>) -> Result<(), SergioError> {
    let other = ctx.registry.get(&spec.other)?;
    if !matches!(ctx.engine.status(&ctx.container.id)?, ContainerStatus::Running) {
        return Err(SergioError::RequirementsNotMet(ctx.container.id.clone()));
    }
    if !matches!(ctx.engine.status(&other.id)?, ContainerStatus::Running) {
        return Err(SergioError::RequirementsNotMet(other.id.clone()));
    }
    let (read_id, write_id, owner) = match spec.direction {
        TransferDirection::Up => (ctx.container.id.clone(), other.id.clone(), other.user.clone()),
        TransferDirection::Down => (other.id.clone(), ctx.container.id.clone(), ctx.container.user.clone()),
    };
    let data = ctx.engine.files_get(&read_id, &spec.source)?;
    ctx.engine.files_put(&write_id, &spec.target, &data, "0644")?;
    let argv = vec!["chown".to_string(), owner, spec.target.clone()];
    ctx.engine.execute(&ctx.container.id, &argv, OutputMode::None)?;
    Ok(())
}

pub fn run_file_remove(path: &str, ctx: &ExecContext<'_, '_>) -> Result<(), SergioError> {
    let expanded = ctx.expand(path);
    ctx.engine.files_delete(&ctx.container.id, &expanded)
}

pub fn run_workdir_set(path: &str, ctx: &ExecContext<'_, '_>) {
    ctx.container.set_workdir(ctx.expand(path));
}

pub fn run_echo(text: &str, ctx: &ExecContext<'_, '_>) {
    let expanded = ctx.expand(text);
    if ctx.output.emits_log() {
        info!("[{}] {}", ctx.container.id, expanded);
    }
}
