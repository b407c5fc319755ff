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
//! An action, once merged across an `extends` chain, is a stack of
//! frames: one per definition that contributed an entry under that
//! name, bottom of the stack being the root ancestor. Running the
//! action runs its top (most derived) frame; a `!parent` item inside a
//! frame delegates to the frame one level down, and a `!idle` item
//! turns the remaining shell items of its own frame non-fatal.
use std::collections::HashMap;

use crate::engine::EngineClient;
use crate::error::SergioError;
use crate::model::{ActionItem, MergedContainer};
use crate::output::OutputMode;
use crate::registry::Registry;
use crate::{items, templater};

#[derive(Debug, Clone, Default)]
pub struct ActionStack {
    pub frames: Vec<Vec<ActionItem>>,
}

impl ActionStack {
    /// Compose a parent's stack with a child's own frame, child on top.
    pub fn then(mut self, child: ActionStack) -> ActionStack {
        self.frames.extend(child.frames);
        self
    }

    pub fn execute(&self, ctx: &ExecContext<'_, '_>, name: &str) -> Result<(), SergioError> {
        if self.frames.is_empty() {
            return Ok(());
        }
        execute_frame(self, ctx, self.frames.len() - 1, name)
    }
}

/// Bundles everything one action invocation needs to run: where to look
/// up other containers, how to reach the engine, which container this
/// run belongs to, and the optional RPC parameter scope layered on top
/// of that container's own variables.
pub struct ExecContext<'a, 'b> {
    pub registry: &'a Registry,
    pub engine: &'a dyn EngineClient,
    pub container: &'b MergedContainer,
    pub rpc_vars: Option<&'b HashMap<String, String>>,
    pub config_dir: &'a std::path::Path,
    pub definitions_dir: &'a std::path::Path,
    pub output: OutputMode,
}

impl<'a, 'b> ExecContext<'a, 'b> {
    pub fn for_container<'c>(
        &self, container: &'c MergedContainer, rpc_vars: Option<&'c HashMap<String, String>>
    ) -> ExecContext<'a, 'c> {
        ExecContext {
            registry: self.registry,
            engine: self.engine,
            container,
            rpc_vars,
            config_dir: self.config_dir,
            definitions_dir: self.definitions_dir,
            output: self.output,
        }
    }

    pub fn expand(&self, text: &str) -> String {
        templater::apply(text, self.registry.global_vars(), &self.container.variables, self.rpc_vars)
    }
}

fn execute_frame(
    stack: &ActionStack, ctx: &ExecContext<'_, '_>, frame_idx: usize, name: &str
) -> Result<(), SergioError> {
    let mut idle = false;
    for item in &stack.frames[frame_idx] {
        match item {
            ActionItem::Idle => idle = true,
            ActionItem::Parent => {
                if frame_idx == 0 {
                    return Err(SergioError::StackUnderflow(name.to_string()));
                }
                execute_frame(stack, ctx, frame_idx - 1, name)?;
            }
            ActionItem::Shell(line) => run_shell(ctx, name, line, idle)?,
            ActionItem::Rpc(spec) => items::run_rpc(spec, ctx)?,
            ActionItem::FileDrop(spec) => items::run_file_drop(spec, ctx)?,
            ActionItem::FileTransfer(spec) => items::run_file_transfer(spec, ctx)?,
            ActionItem::FileRemove(path) => items::run_file_remove(path, ctx)?,
            ActionItem::WorkdirSet(path) => items::run_workdir_set(path, ctx),
            ActionItem::Echo(text) => items::run_echo(text, ctx),
        }
    }
    Ok(())
}

fn run_shell(ctx: &ExecContext<'_, '_>, name: &str, line: &str, idle: bool) -> Result<(), SergioError> {
    let expanded = ctx.expand(line);
    let command_line = match ctx.container.current_workdir() {
        Some(dir) => format!("cd {dir}; {expanded}"),
        None => expanded.clone(),
    };
    if ctx.output.emits_log() {
        info!("[{}] {}", ctx.container.id, expanded);
    }
    let argv = vec![ctx.container.shell.clone(), "-c".to_string(), command_line];
    let code = ctx.engine.execute(&ctx.container.id, &argv, ctx.output)?;
    if code != 0 && !idle {
        return Err(SergioError::ExecutionFailed {
            container: ctx.container.id.clone(),
            line: format!("{name}: {expanded}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileContent, RawPort};
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    struct RecordingEngine {
        calls: RefCell<Vec<Vec<String>>>,
        exit_code: Cell<i32>,
    }

    impl RecordingEngine {
        fn new(exit_code: i32) -> Self {
            Self { calls: RefCell::new(Vec::new()), exit_code: Cell::new(exit_code) }
        }
    }

    impl EngineClient for RecordingEngine {
        fn exists(&self, _id: &str) -> Result<bool, SergioError> { Ok(true) }
        fn status(&self, _id: &str) -> Result<crate::engine::ContainerStatus, SergioError> {
            Ok(crate::engine::ContainerStatus::Running)
        }
        fn launch(&self, _image: &str, _id: &str) -> Result<(), SergioError> { Ok(()) }
        fn start(&self, _id: &str) -> Result<(), SergioError> { Ok(()) }
        fn stop(&self, _id: &str) -> Result<(), SergioError> { Ok(()) }
        fn delete(&self, _id: &str, _force: bool) -> Result<(), SergioError> { Ok(()) }
        fn add_mount(&self, _id: &str, _name: &str, _source: &str, _path: &str) -> Result<(), SergioError> { Ok(()) }
        fn network_state(&self, _id: &str) -> Result<Vec<(String, Vec<crate::engine::NetAddress>)>, SergioError> {
            Ok(Vec::new())
        }
        fn execute(&self, _id: &str, argv: &[String], _output: OutputMode) -> Result<i32, SergioError> {
            self.calls.borrow_mut().push(argv.to_vec());
            Ok(self.exit_code.get())
        }
        fn files_get(&self, _id: &str, _path: &str) -> Result<Vec<u8>, SergioError> { Ok(Vec::new()) }
        fn files_put(&self, _id: &str, _path: &str, _data: &[u8], _mode: &str) -> Result<(), SergioError> { Ok(()) }
        fn files_delete(&self, _id: &str, _path: &str) -> Result<(), SergioError> { Ok(()) }
        fn interactive_shell(&self, _id: &str, _user: &str, _shell: &str, _code: Option<&str>) -> Result<i32, SergioError> {
            Ok(0)
        }
    }

    fn container(id: &str) -> MergedContainer {
        MergedContainer {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            image: "image".to_string(),
            shell: "/bin/sh".to_string(),
            user: "root".to_string(),
            requires: Vec::new(),
            variables: HashMap::new(),
            files: HashMap::<String, FileContent>::new(),
            mountpoints: Vec::new(),
            ports: Vec::<RawPort>::new(),
            actions: HashMap::new(),
            workdir: RefCell::new(None),
            ip_cache: RefCell::new(HashMap::new()),
        }
    }

    #[test]
    fn idle_marker_suppresses_later_failures_in_same_frame() {
        let stack = ActionStack {
            frames: vec![vec![
                ActionItem::Shell("first".to_string()),
                ActionItem::Idle,
                ActionItem::Shell("second".to_string()),
            ]],
        };
        let engine = RecordingEngine::new(1);
        let registry = Registry::new(PathBuf::from("."), HashMap::new());
        let c = container("a");
        let ctx = ExecContext {
            registry: &registry,
            engine: &engine,
            container: &c,
            rpc_vars: None,
            config_dir: std::path::Path::new("."),
            definitions_dir: std::path::Path::new("."),
            output: OutputMode::None,
        };
        let result = stack.execute(&ctx, "boot");
        assert!(result.is_ok());
        assert_eq!(engine.calls.borrow().len(), 2);
    }

    #[test]
    fn failure_before_idle_marker_is_fatal() {
        let stack = ActionStack {
            frames: vec![vec![
                ActionItem::Shell("first".to_string()),
                ActionItem::Idle,
            ]],
        };
        let engine = RecordingEngine::new(1);
        let registry = Registry::new(PathBuf::from("."), HashMap::new());
        let c = container("a");
        let ctx = ExecContext {
            registry: &registry,
            engine: &engine,
            container: &c,
            rpc_vars: None,
            config_dir: std::path::Path::new("."),
            definitions_dir: std::path::Path::new("."),
            output: OutputMode::None,
        };
        let result = stack.execute(&ctx, "boot");
        assert!(result.is_err());
    }

    #[test]
    fn parent_marker_delegates_to_shallower_frame() {
        let stack = ActionStack {
            frames: vec![
                vec![ActionItem::Shell("root-step".to_string())],
                vec![ActionItem::Parent, ActionItem::Shell("child-step".to_string())],
            ],
        };
        let engine = RecordingEngine::new(0);
        let registry = Registry::new(PathBuf::from("."), HashMap::new());
        let c = container("a");
        let ctx = ExecContext {
            registry: &registry,
            engine: &engine,
            container: &c,
            rpc_vars: None,
            config_dir: std::path::Path::new("."),
            definitions_dir: std::path::Path::new("."),
            output: OutputMode::None,
        };
        stack.execute(&ctx, "boot").unwrap();
        let calls = engine.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls[0][2].contains("root-step"));
        assert!(calls[1][2].contains("child-step"));
    }

    #[test]
    fn parent_marker_at_bottom_frame_is_stack_underflow() {
        let stack = ActionStack {
            frames: vec![vec![ActionItem::Parent]],
        };
        let engine = RecordingEngine::new(0);
        let registry = Registry::new(PathBuf::from("."), HashMap::new());
        let c = container("a");
        let ctx = ExecContext {
            registry: &registry,
            engine: &engine,
            container: &c,
            rpc_vars: None,
            config_dir: std::path::Path::new("."),
            definitions_dir: std::path::Path::new("."),
            output: OutputMode::None,
        };
        let result = stack.execute(&ctx, "boot");
        assert!(matches!(result, Err(SergioError::StackUnderflow(_))));
    }
}
