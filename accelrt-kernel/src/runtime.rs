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

//! Runtime context
//!
//! Owns the three registries and the run directory, and ties their
//! lifecycles together:
//!
//! ```text
//! bootstrap:  logging → run dir → sessions → resources → plugins → backends
//! shutdown:   sessions → resources → plugins → run dir
//! ```
//!
//! Sessions and resources go first so that no session hook or resource
//! destructor runs after its backend's library is unloaded.

use crate::config::RuntimeConfig;
use crate::error::AccelResult;
use crate::loader;
use crate::logging;
use crate::plugin::{PluginId, PluginInfo, PluginRegistry};
use crate::resource::{Resource, ResourceRegistry};
use crate::rundir::RunDir;
use crate::session::SessionRegistry;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A bootstrapped runtime
pub struct Runtime {
    config: RuntimeConfig,
    plugins: Arc<PluginRegistry>,
    sessions: SessionRegistry,
    resources: ResourceRegistry,
    rundir: Mutex<Option<RunDir>>,
    rundir_path: PathBuf,
    shut_down: AtomicBool,
}

impl Runtime {
    /// Bring up every subsystem and load the configured backends
    ///
    /// Backend load failures are logged; the runtime still comes up with
    /// whatever loaded before the failure.
    pub fn bootstrap(config: RuntimeConfig) -> AccelResult<Self> {
        logging::init(config.debug_level);

        let rundir = RunDir::create(&config.rundir_root())?;
        let rundir_path = rundir.path().to_path_buf();

        let plugins = Arc::new(PluginRegistry::new());
        let sessions = SessionRegistry::with_capacity(Arc::clone(&plugins), config.max_sessions);
        let resources = ResourceRegistry::with_capacity(config.max_resources);

        sessions.bootstrap()?;
        resources.bootstrap(Some(&rundir_path))?;
        plugins.bootstrap();

        let runtime = Self {
            config,
            plugins,
            sessions,
            resources,
            rundir: Mutex::new(Some(rundir)),
            rundir_path,
            shut_down: AtomicBool::new(false),
        };

        if let Err(e) = loader::load_backends(&runtime.plugins, &runtime.config.backends) {
            warn!(error = %e, "backend loading stopped early");
        }

        info!(
            rundir = %runtime.rundir_path.display(),
            plugins = runtime.plugins.list_plugins().len(),
            "runtime bootstrapped"
        );
        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Base path of the run directory
    pub fn rundir(&self) -> &Path {
        &self.rundir_path
    }

    /// Install a plugin linked into the process
    pub fn register_plugin(&self, info: PluginInfo) -> AccelResult<PluginId> {
        loader::register_builtin(&self.plugins, info)
    }

    /// Load one more backend library
    pub fn load_backend(&self, path: &Path) -> AccelResult<PluginId> {
        loader::load_backend(&self.plugins, path)
    }

    /// Destroy a resource and drop it from every session it was registered with
    pub fn resource_destroy(&self, resource: &Resource) -> AccelResult<()> {
        self.resources.resource_destroy(resource)?;
        let sessions = self.sessions.forget_resource(resource);
        if sessions > 0 {
            debug!(resource = resource.id(), sessions, "dropped associations");
        }
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Tear everything down; idempotent
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let sessions = self.sessions.cleanup();
        let resources = self.resources.cleanup();
        let plugins = self.plugins.shutdown();
        if let Some(mut rundir) = self.rundir.lock().take() {
            rundir.remove();
        }

        info!(sessions, resources, plugins, "runtime shut down");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
