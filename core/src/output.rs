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
use std::str::FromStr;

/// Routes the two independent log sinks a CLI invocation can enable:
/// `actions` forwards in-container stdout/stderr, `log` emits the
/// `[name] message` lines through the `log` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Both,
    Actions,
    Log,
    None,
}

impl OutputMode {
    pub fn forwards_actions(&self) -> bool {
        matches!(self, OutputMode::Both | OutputMode::Actions)
    }

    pub fn emits_log(&self) -> bool {
        matches!(self, OutputMode::Both | OutputMode::Log)
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Both
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "both" => Ok(OutputMode::Both),
            "actions" => Ok(OutputMode::Actions),
            "log" => Ok(OutputMode::Log),
            "none" => Ok(OutputMode::None),
            other => Err(format!("unknown output mode '{other}'")),
        }
    }
}
