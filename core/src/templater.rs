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

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    // Matches both $name and ${name} forms of a placeholder.
    static ref PLACEHOLDER: Regex = Regex::new(
        r"\$\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|\$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)"
    ).unwrap();
}

/// Expand `$name`/`${name}` placeholders in `text` in a single pass.
///
/// Precedence, highest wins: `rpc_vars` > `container_vars` > `global_vars`.
/// A placeholder whose name is undefined in all three scopes is left in
/// the output unchanged. Expansion is not recursive: a value substituted
/// in is never itself re-scanned for placeholders.
pub fn apply(
    text: &str,
    global_vars: &HashMap<String, String>,
    container_vars: &HashMap<String, String>,
    rpc_vars: Option<&HashMap<String, String>>,
) -> String {
    PLACEHOLDER.replace_all(text, |caps: &Captures| {
        let name = caps.name("braced")
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str())
            .unwrap_or("");
        lookup(name, global_vars, container_vars, rpc_vars)
            .unwrap_or_else(|| caps.get(0).unwrap().as_str().to_string())
    }).into_owned()
}

fn lookup(
    name: &str,
    global_vars: &HashMap<String, String>,
    container_vars: &HashMap<String, String>,
    rpc_vars: Option<&HashMap<String, String>>,
) -> Option<String> {
    if let Some(vars) = rpc_vars {
        if let Some(value) = vars.get(name) {
            return Some(value.clone());
        }
    }
    if let Some(value) = container_vars.get(name) {
        return Some(value.clone());
    }
    global_vars.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn unknown_key_passes_through() {
        let global = map(&[("a", "1")]);
        let container = HashMap::new();
        let result = apply("$a-$b", &global, &container, None);
        assert_eq!(result, "1-$b");
    }

    #[test]
    fn braced_form_is_equivalent() {
        let global = map(&[("a", "1")]);
        let container = HashMap::new();
        let result = apply("${a}-${b}", &global, &container, None);
        assert_eq!(result, "1-${b}");
    }

    #[test]
    fn rpc_wins_over_container_wins_over_global() {
        let global = map(&[("x", "global")]);
        let container = map(&[("x", "container")]);
        let rpc = map(&[("x", "rpc")]);

        assert_eq!(apply("$x", &global, &container, Some(&rpc)), "rpc");
        assert_eq!(apply("$x", &global, &container, None), "container");
        assert_eq!(apply("$x", &global, &HashMap::new(), None), "global");
    }

    #[test]
    fn expansion_is_single_pass() {
        let global = map(&[("a", "$b"), ("b", "final")]);
        let result = apply("$a", &global, &HashMap::new(), None);
        assert_eq!(result, "$b");
    }
}
