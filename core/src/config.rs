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
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SergioError;
use crate::lookup::Lookup;

/// The root configuration file: names the definitions directory, the
/// backups directory and the global variable scope.
///
/// ```yaml
/// definitions: /usr/share/sergio/definitions
/// backups: /var/lib/sergio/backups
/// variables:
///   registry: registry.example.com
/// ```
#[derive(Debug, Deserialize)]
pub struct RootConfig {
    definitions: String,
    backups: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,

    #[serde(skip)]
    base_dir: PathBuf,
}

impl RootConfig {
    /// Directory definitions are loaded from, resolved against the
    /// config file's own directory if given as a relative path.
    pub fn definitions_dir(&self) -> PathBuf {
        resolve_relative(&self.base_dir, &self.definitions)
    }

    /// Directory backups are written to and restored from.
    pub fn backups_dir(&self) -> PathBuf {
        resolve_relative(&self.base_dir, &self.backups)
    }

    /// The directory the config file itself lives in; load-references
    /// fall back to this directory after cwd.
    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }
}

fn resolve_relative(base: &Path, value: &str) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

/// Candidate config file locations tried in order, after an explicit
/// `-c` override.
fn discovery_candidates(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("./sergio.yml"),
        PathBuf::from("./sergio.yaml"),
        PathBuf::from("./config.yml"),
        PathBuf::from("./config.yaml"),
    ];
    if let Some(home) = home {
        candidates.push(home.join("sergio.yml"));
        candidates.push(home.join("sergio.yaml"));
    }
    candidates
}

/// Resolve the config file path per the discovery order: an explicit
/// override, then the first existing well-known location.
pub fn discover_config_path(
    explicit: Option<&str>, home: Option<PathBuf>
) -> Result<PathBuf, SergioError> {
    if let Some(path) = explicit {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(SergioError::ConfigNotFound);
    }
    for candidate in discovery_candidates(home) {
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(SergioError::ConfigNotFound)
}

/// Read and parse the root configuration file.
pub fn read_root_config(path: &Path) -> Result<RootConfig, SergioError> {
    if Lookup::is_debug() {
        debug!("Reading root config file: {}", path.display());
    }
    let content = std::fs::read_to_string(path)?;
    let mut config: RootConfig = serde_yaml::from_str(&content)
        .map_err(|error| SergioError::ParseError {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
    config.base_dir = path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(config)
}
