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
use clap::Parser;

/// sergio CONTAINER VERB [PARAMS...]
///
/// PARAMS are only meaningful for `exec`/ad-hoc RPC verbs and `restore`,
/// given as bare positional tokens (`key=value` for RPC parameters, a
/// single path for `restore`, `src dst` for `download`/`upload`).
#[derive(Debug, Parser)]
#[clap(name = "sergio", version)]
pub struct Cli {
    /// Container identifier, as named by its definition file
    pub container: String,

    /// Verb to run: create, start, stop, destroy, nat, denat, login,
    /// backup, restore, download, upload, exec, running, or any other
    /// action name defined on the container
    pub verb: String,

    /// Positional parameters for the verb (RPC key=value pairs, a
    /// restore path, or download/upload source and destination)
    pub params: Vec<String>,

    /// Recurse into unmet requirements instead of failing
    #[clap(short = 'r', long)]
    pub recursive: bool,

    /// Explicit root configuration file, bypassing discovery
    #[clap(short = 'c', long = "config")]
    pub config: Option<String>,

    /// What to forward to the terminal: both, actions, log, or none
    #[clap(short = 'o', long = "output", default_value = "both")]
    pub output: String,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
