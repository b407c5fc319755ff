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
//! Port forwarding through the host's PREROUTING chain. One rule per
//! `ports` entry, addressed to the container's resolved address on the
//! fixed external interface.
use crate::command::CommandExtTrait;
use crate::error::SergioError;
use crate::lookup::Lookup;
use crate::user::User;

pub const EXTERNAL_DEVICE: &str = "enp1s0f0";

pub trait NatClient {
    /// Insert a PREROUTING DNAT rule: traffic arriving on `external_port`
    /// is forwarded to `target_address:internal_port`.
    fn add_forward(
        &self, protocol: &str, external_port: u16, internal_port: u16, target_address: &str, comment: &str,
    ) -> Result<(), SergioError>;

    /// Remove every PREROUTING rule whose listed port matches
    /// `dpt:<external_port>`. Matched by substring, so two containers
    /// sharing an external port can alias each other's rule.
    fn remove_forward(&self, external_port: u16) -> Result<(), SergioError>;
}

pub struct IptablesClient {
    binary: &'static str,
}

impl IptablesClient {
    pub fn v4() -> Self {
        Self { binary: "iptables" }
    }

    pub fn v6() -> Self {
        Self { binary: "ip6tables" }
    }

    fn list_prerouting(&self) -> Result<Vec<String>, SergioError> {
        let mut call = User::ROOT.run(self.binary);
        call.arg("-t").arg("nat").arg("-L").arg("PREROUTING")
            .arg("--line-numbers").arg("-n");
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        let output = call.perform()?;
        Ok(String::from_utf8_lossy(&output.stdout).lines().map(String::from).collect())
    }
}

impl NatClient for IptablesClient {
    fn add_forward(
        &self, protocol: &str, external_port: u16, internal_port: u16, target_address: &str, comment: &str,
    ) -> Result<(), SergioError> {
        let mut call = User::ROOT.run(self.binary);
        call.arg("-t").arg("nat")
            .arg("-A").arg("PREROUTING")
            .arg("-i").arg(EXTERNAL_DEVICE)
            .arg("-p").arg(protocol)
            .arg("--dport").arg(external_port.to_string())
            .arg("-j").arg("DNAT")
            .arg("--to-destination").arg(format!("{target_address}:{internal_port}"))
            .arg("-m").arg("comment").arg("--comment").arg(comment);
        if Lookup::is_debug() {
            debug!("{:?}", call.get_args());
        }
        call.perform()?;
        Ok(())
    }

    fn remove_forward(&self, external_port: u16) -> Result<(), SergioError> {
        // Rule numbers shift once a delete happens, so rules are removed
        // highest line number first.
        let needle = format!("dpt:{external_port}");
        let lines = self.list_prerouting()?;
        let mut matches: Vec<u32> = lines.iter()
            .filter(|line| line.contains(&needle))
            .filter_map(|line| line.split_whitespace().next())
            .filter_map(|token| token.parse().ok())
            .collect();
        matches.sort_unstable_by(|a, b| b.cmp(a));
        for line_number in matches {
            let mut call = User::ROOT.run(self.binary);
            call.arg("-t").arg("nat").arg("-D").arg("PREROUTING").arg(line_number.to_string());
            if Lookup::is_debug() {
                debug!("{:?}", call.get_args());
            }
            call.perform()?;
        }
        Ok(())
    }
}
