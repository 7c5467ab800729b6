// SPDX-License-Identifier: AGPL-3.0-or-later
// AccelRT - Host-side Acceleration Runtime
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Runtime configuration
//!
//! Settings come from the environment (`ACCELRT_*`) with defaults that
//! match a per-user runtime. Tests build configs directly with the
//! `with_*` setters.

use crate::error::{AccelError, AccelResult};
use crate::resource::DEFAULT_MAX_RESOURCES;
use crate::session::DEFAULT_MAX_SESSIONS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Colon-separated list of backend libraries to load
pub const ENV_BACKENDS: &str = "ACCELRT_BACKENDS";
/// Log verbosity, 1 (error) to 4 (debug)
pub const ENV_DEBUG_LEVEL: &str = "ACCELRT_DEBUG_LEVEL";
/// Parent of the per-process run directory
pub const ENV_RUNDIR: &str = "ACCELRT_RUNDIR";
pub const ENV_MAX_RESOURCES: &str = "ACCELRT_MAX_RESOURCES";
pub const ENV_MAX_SESSIONS: &str = "ACCELRT_MAX_SESSIONS";

/// Default debug level (errors only)
pub const DEFAULT_DEBUG_LEVEL: u8 = 1;

/// Configuration of a [`crate::Runtime`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Backend libraries, loaded in order
    pub backends: Vec<PathBuf>,
    pub debug_level: u8,
    /// `None` means `/run/user/<uid>`
    pub rundir_root: Option<PathBuf>,
    pub max_resources: u32,
    pub max_sessions: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            debug_level: DEFAULT_DEBUG_LEVEL,
            rundir_root: None,
            max_resources: DEFAULT_MAX_RESOURCES,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl RuntimeConfig {
    /// Configuration from the process environment
    pub fn from_env() -> AccelResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AccelResult<Self> {
        let mut config = Self::default();

        if let Some(list) = lookup(ENV_BACKENDS) {
            config.backends = parse_backend_list(&list);
        }
        if let Some(level) = lookup(ENV_DEBUG_LEVEL) {
            config.debug_level = parse_number(ENV_DEBUG_LEVEL, &level)?;
        }
        if let Some(root) = lookup(ENV_RUNDIR).filter(|root| !root.is_empty()) {
            config.rundir_root = Some(PathBuf::from(root));
        }
        if let Some(max) = lookup(ENV_MAX_RESOURCES) {
            config.max_resources = parse_number(ENV_MAX_RESOURCES, &max)?;
        }
        if let Some(max) = lookup(ENV_MAX_SESSIONS) {
            config.max_sessions = parse_number(ENV_MAX_SESSIONS, &max)?;
        }

        Ok(config)
    }

    pub fn with_backends(mut self, backends: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.backends = backends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    pub fn with_rundir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.rundir_root = Some(root.into());
        self
    }

    pub fn with_max_resources(mut self, max: u32) -> Self {
        self.max_resources = max;
        self
    }

    pub fn with_max_sessions(mut self, max: u32) -> Self {
        self.max_sessions = max;
        self
    }

    /// Directory the run directory is created in
    pub fn rundir_root(&self) -> PathBuf {
        self.rundir_root.clone().unwrap_or_else(default_rundir_root)
    }
}

/// Split a colon-separated library list, skipping empty entries
pub fn parse_backend_list(list: &str) -> Vec<PathBuf> {
    list.split(':')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> AccelResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| {
            AccelError::InvalidArgument(format!("{}: '{}' is not a valid number", key, value))
        })
}

#[cfg(unix)]
fn default_rundir_root() -> PathBuf {
    // SAFETY: getuid has no preconditions and cannot fail
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/run/user/{}", uid))
}

#[cfg(not(unix))]
fn default_rundir_root() -> PathBuf {
    std::env::temp_dir()
}
