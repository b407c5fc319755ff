//
// Copyright (c) 2023 Elektrobit Automotive GmbH
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
use std::process::{ExitCode, Output, Termination};
use thiserror::Error;

use crate::command::{CommandError, ProcessError};

/// The single error type surfaced by the sergio core.
///
/// Each variant corresponds to one of the error kinds named in the
/// lifecycle and resolution design: a failed definition lookup, a broken
/// dependency graph, a non-zero shell action, and so on. Subprocess
/// failures (iptables, the engine CLI) pass through [CommandError] so the
/// offending argv is preserved in the message.
#[derive(Debug, Error)]
pub enum SergioError {
    /// The pilot tried to run a sub command and failed
    #[error("Failed to run {}", .0)]
    CommandError(#[from] CommandError),

    /// IO operation pass through
    #[error(transparent)]
    IO(#[from] std::io::Error),

    /// YAML parsing or tag construction failed
    #[error("Failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    /// No root configuration file could be discovered
    #[error("No configuration file found")]
    ConfigNotFound,

    /// Registry could not locate `<id>.y{a,}ml`
    #[error("No definition found for '{0}'")]
    DefinitionNotFound(String),

    /// `extends` forms a cycle
    #[error("Circular 'extends' chain detected at '{0}'")]
    CircularExtends(String),

    /// A prerequisite is missing or not running under non-recursive mode
    #[error("Requirements not met for '{0}', consider -r")]
    RequirementsNotMet(String),

    /// The dependency graph has a cycle
    #[error("Unresolvable requirements, a dependency cycle was detected")]
    UnresolvableRequirements,

    /// The engine failed to launch a container
    #[error("Launch failed for '{0}'")]
    LaunchFailed(String),

    /// A shell action item returned non-zero outside an idle frame
    #[error("Execution failed for '{container}': {line}")]
    ExecutionFailed { container: String, line: String },

    /// `!parent` was used at the bottom of a stack
    #[error("Stack underflow, no parent frame for action '{0}'")]
    StackUnderflow(String),

    /// IP lookup referenced a device not present in the network state
    #[error("No such device '{device}' on container '{container}'")]
    NoSuchDevice { container: String, device: String },

    /// A file-transfer direction token was not recognized
    #[error("Unrecognized transfer direction '{0}'")]
    BadDirection(String),

    /// A load-reference resolved to no existing file
    #[error("File not found: '{0}'")]
    FileNotFound(String),

    /// Container already exists / already running where the verb forbids it
    #[error("'{0}' already exists")]
    AlreadyExists(String),

    /// `backup`/`restore` invoked on a container with no such action defined
    #[error("'{container}' has no '{action}' action defined")]
    RequiredActionMissing { container: String, action: String },
}

impl Termination for SergioError {
    /// A failed sub command forwards its exit code; all other errors are
    /// represented as failure.
    fn report(self) -> ExitCode {
        match self {
            SergioError::CommandError(CommandError {
                base: ProcessError::ExecutionError(Output { status, .. }),
                ..
            }) => match status.code() {
                Some(code) => (code as u8).into(),
                None => ExitCode::FAILURE,
            },
            _ => ExitCode::FAILURE,
        }
    }
}
