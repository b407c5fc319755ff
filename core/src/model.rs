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
//! On-disk container definitions and the tagged action-item values they
//! expand into. `RawContainer` is what serde hands back from a single
//! YAML document; `MergedContainer` is the arena-like, post-inheritance
//! value the rest of the core operates on.
use std::cell::RefCell;
use std::collections::HashMap;

use serde::Deserialize;

use crate::error::SergioError;
use crate::stack::ActionStack;

pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_USER: &str = "root";

#[derive(Debug, Deserialize)]
pub struct Document {
    pub container: RawContainer,
}

#[derive(Debug, Deserialize)]
pub struct RawContainer {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "box")]
    pub image: Option<String>,
    pub shell: Option<String>,
    pub user: Option<String>,
    pub extends: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub files: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub mountpoints: HashMap<String, RawMountpoint>,
    #[serde(default)]
    pub ports: Vec<RawPort>,
    #[serde(default)]
    pub actions: HashMap<String, Vec<serde_yaml::Value>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawMountpoint {
    pub source: String,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawPort {
    /// Container-side network device used to resolve the forwarding
    /// target's address. Falls back to scanning every device reported
    /// by the engine's network state when absent.
    pub device: Option<String>,
    pub protocol: String,
    pub from: u16,
    pub to: u16,
    pub comment: Option<String>,
}

/// Resolved content of one `files` entry: either the literal string
/// given inline, or a load-reference resolved on first use.
#[derive(Debug, Clone)]
pub enum FileContent {
    Inline(String),
    LoadRef(LoadRef),
}

#[derive(Debug, Clone)]
pub struct LoadRef {
    pub filename: String,
    pub is_bytes: bool,
}

/// One item of an action frame.
#[derive(Debug, Clone)]
pub enum ActionItem {
    Shell(String),
    Rpc(RpcSpec),
    FileDrop(FileDropSpec),
    FileTransfer(FileTransferSpec),
    FileRemove(String),
    WorkdirSet(String),
    Echo(String),
    /// Sentinel: non-zero shell exits after this point in the frame are
    /// not fatal.
    Idle,
    /// Sentinel: delegates execution to the frame one level shallower.
    Parent,
}

#[derive(Debug, Clone)]
pub struct RpcSpec {
    pub target: String,
    pub action: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct FileDropSpec {
    pub filename: String,
    pub chown: Option<String>,
    pub chmod: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileTransferSpec {
    pub direction: TransferDirection,
    pub other: String,
    pub source: String,
    pub target: String,
}

/// Parse a `files` map value: either a plain string or a `!load` node.
pub fn parse_file_content(value: &serde_yaml::Value) -> Result<FileContent, SergioError> {
    match value {
        serde_yaml::Value::String(text) => Ok(FileContent::Inline(text.clone())),
        serde_yaml::Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            if tag.trim_start_matches('!') != "load" {
                return Err(SergioError::ParseError {
                    path: "files".to_string(),
                    message: format!("unsupported tag '{tag}' in files entry"),
                });
            }
            parse_load_ref(&tagged.value)
        }
        other => Err(SergioError::ParseError {
            path: "files".to_string(),
            message: format!("unsupported files entry: {other:?}"),
        }),
    }
}

fn parse_load_ref(value: &serde_yaml::Value) -> Result<LoadRef, SergioError> {
    match value {
        serde_yaml::Value::String(filename) => Ok(LoadRef { filename: filename.clone(), is_bytes: false }),
        serde_yaml::Value::Mapping(_) => {
            #[derive(Deserialize)]
            struct Raw {
                filename: String,
                #[serde(default, alias = "is-bytes")]
                is_bytes: bool,
            }
            let raw: Raw = serde_yaml::from_value(value.clone())
                .map_err(|error| SergioError::ParseError {
                    path: "files".to_string(),
                    message: error.to_string(),
                })?;
            Ok(LoadRef { filename: raw.filename, is_bytes: raw.is_bytes })
        }
        other => Err(SergioError::ParseError {
            path: "files".to_string(),
            message: format!("malformed !load node: {other:?}"),
        }),
    }
}

/// Parse one node of an `actions` sequence into an [ActionItem].
pub fn parse_action_item(value: &serde_yaml::Value) -> Result<ActionItem, SergioError> {
    match value {
        serde_yaml::Value::String(text) => Ok(ActionItem::Shell(text.clone())),
        serde_yaml::Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let tag = tag.trim_start_matches('!');
            let scalar = scalar_string(&tagged.value);
            match tag {
                "idle" => Ok(ActionItem::Idle),
                "parent" => Ok(ActionItem::Parent),
                "rpc" => parse_rpc(&scalar.unwrap_or_default()),
                "df" => parse_file_drop(&scalar.unwrap_or_default()),
                "tf" => parse_file_transfer(&scalar.unwrap_or_default()),
                "rm" => Ok(ActionItem::FileRemove(scalar.unwrap_or_default())),
                "cwd" => Ok(ActionItem::WorkdirSet(scalar.unwrap_or_default())),
                "echo" => Ok(ActionItem::Echo(scalar.unwrap_or_default())),
                other => Err(SergioError::ParseError {
                    path: "actions".to_string(),
                    message: format!("unknown action tag '!{other}'"),
                }),
            }
        }
        other => Err(SergioError::ParseError {
            path: "actions".to_string(),
            message: format!("unsupported action item: {other:?}"),
        }),
    }
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(text) => Some(text.clone()),
        serde_yaml::Value::Null => None,
        other => serde_yaml::to_string(other).ok(),
    }
}

/// `self greet who=world` -> target=self, action=greet, {who: world}
fn parse_rpc(raw: &str) -> Result<ActionItem, SergioError> {
    let mut tokens = raw.split_whitespace();
    let target = tokens.next().ok_or_else(|| SergioError::ParseError {
        path: "!rpc".to_string(), message: "missing target".to_string(),
    })?.to_string();
    let action = tokens.next().ok_or_else(|| SergioError::ParseError {
        path: "!rpc".to_string(), message: "missing action".to_string(),
    })?.to_string();
    let mut params = HashMap::new();
    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            params.insert(key.to_string(), value.to_string());
        }
    }
    Ok(ActionItem::Rpc(RpcSpec { target, action, params }))
}

/// `chown=user:user chmod=0644 /path/to/file` (shell-style token split)
fn parse_file_drop(raw: &str) -> Result<ActionItem, SergioError> {
    let tokens = shell_words::split(raw).map_err(|error| SergioError::ParseError {
        path: "!df".to_string(), message: error.to_string(),
    })?;
    let mut chown = None;
    let mut chmod = None;
    let mut rest = Vec::new();
    for token in tokens {
        if let Some(value) = token.strip_prefix("chown=") {
            chown = Some(value.to_string());
        } else if let Some(value) = token.strip_prefix("chmod=") {
            chmod = Some(value.to_string());
        } else {
            rest.push(token);
        }
    }
    if rest.is_empty() {
        return Err(SergioError::ParseError {
            path: "!df".to_string(), message: "missing filename".to_string(),
        });
    }
    Ok(ActionItem::FileDrop(FileDropSpec { filename: rest.join(" "), chown, chmod }))
}

/// `up other-id src dst` / `<down> other-id src dst`
fn parse_file_transfer(raw: &str) -> Result<ActionItem, SergioError> {
    let mut tokens = raw.split_whitespace();
    let direction_token = tokens.next().ok_or_else(|| SergioError::ParseError {
        path: "!tf".to_string(), message: "missing direction".to_string(),
    })?;
    let direction = match direction_token {
        "d" | "down" | "<" => TransferDirection::Down,
        "u" | "up" | ">" => TransferDirection::Up,
        other => return Err(SergioError::BadDirection(other.to_string())),
    };
    let other = tokens.next().ok_or_else(|| SergioError::ParseError {
        path: "!tf".to_string(), message: "missing other-container-id".to_string(),
    })?.to_string();
    let source = tokens.next().ok_or_else(|| SergioError::ParseError {
        path: "!tf".to_string(), message: "missing source-path".to_string(),
    })?.to_string();
    let target = tokens.next().ok_or_else(|| SergioError::ParseError {
        path: "!tf".to_string(), message: "missing target-path".to_string(),
    })?.to_string();
    Ok(ActionItem::FileTransfer(FileTransferSpec { direction, other, source, target }))
}

/// The merged, post-inheritance container. Owned by the registry's arena
/// and handed out as `Rc<MergedContainer>`; `workdir` and `ip_cache` are
/// the only mutable, per-invocation state it carries.
#[derive(Debug)]
pub struct MergedContainer {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub shell: String,
    pub user: String,
    pub requires: Vec<String>,
    pub variables: HashMap<String, String>,
    pub files: HashMap<String, FileContent>,
    pub mountpoints: Vec<(String, RawMountpoint)>,
    pub ports: Vec<RawPort>,
    pub actions: HashMap<String, ActionStack>,
    pub workdir: RefCell<Option<String>>,
    pub ip_cache: RefCell<HashMap<(String, u8), String>>,
}

impl MergedContainer {
    pub fn set_workdir(&self, path: String) {
        *self.workdir.borrow_mut() = Some(path);
    }

    pub fn current_workdir(&self) -> Option<String> {
        self.workdir.borrow().clone()
    }

    pub fn cached_ip(&self, device: &str, family: u8) -> Option<String> {
        self.ip_cache.borrow().get(&(device.to_string(), family)).cloned()
    }

    pub fn cache_ip(&self, device: &str, family: u8, address: String) {
        self.ip_cache.borrow_mut().insert((device.to_string(), family), address);
    }
}
