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
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::SergioError;
use crate::lookup::Lookup;
use crate::model::{
    self, ActionItem, Document, FileContent, MergedContainer, DEFAULT_SHELL, DEFAULT_USER,
};
use crate::stack::ActionStack;

/// Lazily loads and memoizes per-container definitions for the duration
/// of one CLI invocation, flattening `extends` as they are discovered.
pub struct Registry {
    definitions_dir: PathBuf,
    global_vars: HashMap<String, String>,
    cache: RefCell<HashMap<String, Rc<MergedContainer>>>,
    loading: RefCell<HashSet<String>>,
}

impl Registry {
    pub fn new(definitions_dir: PathBuf, global_vars: HashMap<String, String>) -> Self {
        Self {
            definitions_dir,
            global_vars,
            cache: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
        }
    }

    pub fn global_vars(&self) -> &HashMap<String, String> {
        &self.global_vars
    }

    /// True if the container is already memoized or a definition file
    /// exists for it under the definitions directory.
    pub fn has(&self, id: &str) -> bool {
        if self.cache.borrow().contains_key(id) {
            return true;
        }
        self.find_definition_path(id).is_ok()
    }

    /// Return the memoized merged container, loading and flattening its
    /// `extends` chain on first access.
    pub fn get(&self, id: &str) -> Result<Rc<MergedContainer>, SergioError> {
        if let Some(existing) = self.cache.borrow().get(id) {
            return Ok(existing.clone());
        }
        if !self.loading.borrow_mut().insert(id.to_string()) {
            return Err(SergioError::CircularExtends(id.to_string()));
        }
        let built = self.load(id);
        self.loading.borrow_mut().remove(id);
        let container = Rc::new(built?);
        self.cache.borrow_mut().insert(id.to_string(), container.clone());
        Ok(container)
    }

    fn find_definition_path(&self, id: &str) -> Result<PathBuf, SergioError> {
        let yaml = self.definitions_dir.join(format!("{id}.yaml"));
        if yaml.exists() {
            return Ok(yaml);
        }
        let yml = self.definitions_dir.join(format!("{id}.yml"));
        if yml.exists() {
            return Ok(yml);
        }
        Err(SergioError::DefinitionNotFound(id.to_string()))
    }

    fn load(&self, id: &str) -> Result<MergedContainer, SergioError> {
        let path = self.find_definition_path(id)?;
        if Lookup::is_debug() {
            debug!("Reading definition file: {}", path.display());
        }
        let content = std::fs::read_to_string(&path)?;
        let document: Document = serde_yaml::from_str(&content)
            .map_err(|error| SergioError::ParseError {
                path: path.display().to_string(),
                message: error.to_string(),
            })?;
        let raw = document.container;

        let parent = match &raw.extends {
            Some(parent_id) => Some(self.get(parent_id)?),
            None => None,
        };

        let image = raw.image.clone()
            .or_else(|| parent.as_ref().map(|p| p.image.clone()))
            .unwrap_or_default();
        let shell = raw.shell.clone()
            .or_else(|| parent.as_ref().map(|p| p.shell.clone()))
            .unwrap_or_else(|| DEFAULT_SHELL.to_string());
        let user = raw.user.clone()
            .or_else(|| parent.as_ref().map(|p| p.user.clone()))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let mut requires = raw.requires.clone();
        if let Some(parent) = &parent {
            requires.extend(parent.requires.clone());
        }

        let mut variables = HashMap::new();
        if let Some(parent) = &parent {
            variables.extend(parent.variables.clone());
        }
        variables.extend(raw.variables.clone());
        variables.insert("_name".to_string(), raw.name.clone());
        variables.insert("_description".to_string(), raw.description.clone());

        let mut files = HashMap::new();
        if let Some(parent) = &parent {
            files.extend(
                parent.files.iter().map(|(k, v)| (k.clone(), clone_file_content(v)))
            );
        }
        for (key, value) in &raw.files {
            files.insert(key.clone(), model::parse_file_content(value)?);
        }

        let mountpoints: Vec<(String, model::RawMountpoint)> =
            raw.mountpoints.into_iter().collect();

        let ports: Vec<model::RawPort> = raw.ports;

        let mut actions: HashMap<String, ActionStack> = HashMap::new();
        if let Some(parent) = &parent {
            for (name, stack) in &parent.actions {
                actions.insert(name.clone(), stack.clone());
            }
        }
        for (name, items) in &raw.actions {
            let frame: Vec<ActionItem> = items.iter()
                .map(model::parse_action_item)
                .collect::<Result<_, _>>()?;
            let child_stack = ActionStack { frames: vec![frame] };
            match actions.remove(name) {
                Some(parent_stack) => { actions.insert(name.clone(), parent_stack.then(child_stack)); }
                None => { actions.insert(name.clone(), child_stack); }
            }
        }

        Ok(MergedContainer {
            id: id.to_string(),
            name: raw.name,
            description: raw.description,
            image,
            shell,
            user,
            requires,
            variables,
            files,
            mountpoints,
            ports,
            actions,
            workdir: RefCell::new(None),
            ip_cache: RefCell::new(HashMap::new()),
        })
    }
}

fn clone_file_content(value: &FileContent) -> FileContent {
    match value {
        FileContent::Inline(s) => FileContent::Inline(s.clone()),
        FileContent::LoadRef(r) => FileContent::LoadRef(r.clone()),
    }
}

/// Resolve a load-reference's filename against cwd, then the config
/// directory, then the definitions directory, and read its bytes.
pub fn resolve_load_ref(
    filename: &str, config_dir: &Path, definitions_dir: &Path
) -> Result<Vec<u8>, SergioError> {
    for base in [Path::new("."), config_dir, definitions_dir] {
        let candidate = base.join(filename);
        if candidate.exists() {
            return Ok(std::fs::read(candidate)?);
        }
    }
    Err(SergioError::FileNotFound(filename.to_string()))
}
