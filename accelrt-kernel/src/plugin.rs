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

//! Plugin Registry and Operation Dispatch
//!
//! Backends are plugins: a descriptor ([`PluginInfo`]) naming the backend,
//! its kind and its lifecycle hooks, plus the set of operations it registers
//! during `init`. The registry owns every registered plugin and answers the
//! dispatch question "which callable runs operation X, preferring backend
//! kind Y".
//!
//! ## Resolution
//!
//! Strict two-tier priority:
//!
//! 1. the first registered implementation whose owner matches the preferred
//!    backend kind, if one was requested
//! 2. otherwise the first registered implementation of the type
//!
//! Ties are broken purely by registration order.
//!
//! ## Lifecycle
//!
//! ```text
//!  Uninitialized ──bootstrap()──► Bootstrapped ──shutdown()──► Uninitialized
//! ```
//!
//! Every operation other than `bootstrap` fails with
//! [`AccelError::BackendNotReady`] while uninitialized.

use crate::error::{AccelError, AccelResult};
use crate::op::{OpFn, OpType, OP_TYPE_COUNT};
use crate::resource::ResourceId;
use crate::session::{SessionFlags, SessionId};
use libloading::Library;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Registration handle of a plugin
///
/// Handles are never reused, so a stale handle keeps failing with
/// [`AccelError::NotFound`] even when another plugin of the same name has
/// been registered since.
pub type PluginId = u64;

// ============================================================================
// Backend Kinds
// ============================================================================

/// Execution target of a backend
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Software / no-op backends
    Generic = 1 << 0,
    Cpu = 1 << 1,
    Gpu = 1 << 2,
    Fpga = 1 << 3,
    /// Remote execution across a virtualization boundary
    Remote = 1 << 4,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Generic,
        BackendKind::Cpu,
        BackendKind::Gpu,
        BackendKind::Fpga,
        BackendKind::Remote,
    ];

    /// Tag bit used in session flags
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Lowest-numbered kind whose tag bit is set in `bits`
    pub fn from_tag(bits: u32) -> Option<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| bits & kind.tag() != 0)
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Generic => "generic",
            BackendKind::Cpu => "cpu",
            BackendKind::Gpu => "gpu",
            BackendKind::Fpga => "fpga",
            BackendKind::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = AccelError;

    fn from_str(s: &str) -> AccelResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "virtio" => Ok(BackendKind::Remote),
            other => BackendKind::ALL
                .into_iter()
                .find(|kind| kind.name() == other)
                .ok_or_else(|| {
                    AccelError::InvalidArgument(format!("unknown backend kind '{}'", s))
                }),
        }
    }
}

// ============================================================================
// Plugin Descriptor
// ============================================================================

/// Plugin `init` hook; registers the plugin's operations through the registrar
pub type InitFn = Arc<dyn Fn(&OpRegistrar<'_>) -> AccelResult<()> + Send + Sync>;

/// Plugin `fini` hook
pub type FiniFn = Arc<dyn Fn() -> AccelResult<()> + Send + Sync>;

/// Session-lifecycle hooks of a delegating backend
///
/// A backend that manages sessions across a remote boundary mirrors every
/// session lifecycle and association call it receives here.
pub trait SessionHooks: Send + Sync {
    fn sess_init(&self, session: SessionId, flags: SessionFlags) -> AccelResult<()>;

    fn sess_update(&self, session: SessionId, flags: SessionFlags) -> AccelResult<()>;

    fn sess_free(&self, session: SessionId) -> AccelResult<()>;

    fn sess_register(&self, session: SessionId, resource: ResourceId) -> AccelResult<()>;

    fn sess_unregister(&self, session: SessionId, resource: ResourceId) -> AccelResult<()>;
}

/// Backend descriptor handed to the registry
///
/// `name`, `init` and `fini` are mandatory; registration rejects a
/// descriptor missing any of them.
#[derive(Clone)]
pub struct PluginInfo {
    /// Unique plugin name
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Execution target
    pub kind: BackendKind,
    pub init: Option<InitFn>,
    pub fini: Option<FiniFn>,
    /// Present only on delegating backends
    pub session_hooks: Option<Arc<dyn SessionHooks>>,
}

impl PluginInfo {
    /// Descriptor with no-op `init`/`fini`
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            version: String::from("0.0.0"),
            kind,
            init: Some(Arc::new(init_nothing)),
            fini: Some(Arc::new(fini_nothing)),
            session_hooks: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_init(
        mut self,
        init: impl Fn(&OpRegistrar<'_>) -> AccelResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.init = Some(Arc::new(init));
        self
    }

    pub fn with_fini(mut self, fini: impl Fn() -> AccelResult<()> + Send + Sync + 'static) -> Self {
        self.fini = Some(Arc::new(fini));
        self
    }

    pub fn with_session_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.session_hooks = Some(hooks);
        self
    }

    fn validate(&self) -> AccelResult<()> {
        if self.name.is_empty() {
            return Err(AccelError::InvalidArgument("plugin name is missing".into()));
        }
        if self.init.is_none() || self.fini.is_none() {
            return Err(AccelError::InvalidArgument(format!(
                "plugin '{}' must provide both init and fini",
                self.name
            )));
        }
        Ok(())
    }
}

fn init_nothing(_: &OpRegistrar<'_>) -> AccelResult<()> {
    Ok(())
}

fn fini_nothing() -> AccelResult<()> {
    Ok(())
}

impl fmt::Debug for PluginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInfo")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("init", &self.init.is_some())
            .field("fini", &self.fini.is_some())
            .field("session_hooks", &self.session_hooks.is_some())
            .finish()
    }
}

/// A backend: descriptor plus the library its code lives in
///
/// Field order matters: the descriptor (and every closure it owns) is
/// dropped before the library is unloaded.
#[derive(Default)]
pub struct Plugin {
    info: Option<PluginInfo>,
    library: Option<Library>,
}

impl Plugin {
    pub fn new(info: PluginInfo) -> Self {
        Self {
            info: Some(info),
            library: None,
        }
    }

    /// Attach the dynamically loaded library backing this plugin
    pub fn with_library(mut self, library: Library) -> Self {
        self.library = Some(library);
        self
    }

    pub fn info(&self) -> Option<&PluginInfo> {
        self.info.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.info.as_ref().map(|info| info.name.as_str())
    }

    pub fn has_library(&self) -> bool {
        self.library.is_some()
    }

    /// Run `fini`, then release the descriptor and the library
    pub fn finalize(mut self) -> AccelResult<()> {
        let result = match self.info.as_ref() {
            Some(PluginInfo {
                name,
                fini: Some(fini),
                ..
            }) => fini().map_err(|e| AccelError::backend(name, e)),
            _ => Ok(()),
        };
        drop(self.info.take());
        drop(self.library.take());
        result
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("info", &self.info)
            .field("library", &self.library.is_some())
            .finish()
    }
}

/// One operation registration: a callable and the plugin owning it
#[derive(Debug, Clone)]
pub struct PluginOp {
    pub owner: PluginId,
    pub func: OpFn,
}

impl PluginOp {
    pub fn new(owner: PluginId, func: OpFn) -> Self {
        Self { owner, func }
    }

    pub fn op_type(&self) -> OpType {
        self.func.op_type()
    }
}

/// Registration surface handed to a plugin's `init`
pub struct OpRegistrar<'a> {
    registry: &'a PluginRegistry,
    owner: PluginId,
}

impl OpRegistrar<'_> {
    /// Handle of the plugin being initialized
    pub fn owner(&self) -> PluginId {
        self.owner
    }

    pub fn register(&self, func: OpFn) -> AccelResult<()> {
        self.registry
            .register_plugin_function(PluginOp::new(self.owner, func))
    }

    pub fn register_all(&self, funcs: impl IntoIterator<Item = OpFn>) -> AccelResult<()> {
        self.registry.register_plugin_functions(
            funcs
                .into_iter()
                .map(|func| PluginOp::new(self.owner, func)),
        )
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Result of operation resolution
#[derive(Debug, Clone)]
pub struct ResolvedOp {
    pub plugin: PluginId,
    pub plugin_name: String,
    pub kind: BackendKind,
    pub func: OpFn,
}

/// Diagnostic view of a registered plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub id: PluginId,
    pub name: String,
    pub version: String,
    pub kind: BackendKind,
    pub delegating: bool,
    pub dynamic: bool,
    pub ops: Vec<OpType>,
}

struct RegisteredPlugin {
    id: PluginId,
    plugin: Plugin,
    ops: Vec<OpType>,
}

impl RegisteredPlugin {
    fn info(&self) -> AccelResult<&PluginInfo> {
        self.plugin.info().ok_or_else(|| {
            AccelError::InvalidArgument(format!("plugin {} lost its descriptor", self.id))
        })
    }
}

struct OpEntry {
    owner: PluginId,
    kind: BackendKind,
    func: OpFn,
}

struct RegistryState {
    next_id: PluginId,
    /// Registration order
    plugins: Vec<RegisteredPlugin>,
    /// Implementations per operation type, registration order
    ops: Vec<Vec<OpEntry>>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            next_id: 1,
            plugins: Vec::new(),
            ops: (0..OP_TYPE_COUNT).map(|_| Vec::new()).collect(),
        }
    }

    fn find(&self, id: PluginId) -> Option<&RegisteredPlugin> {
        self.plugins.iter().find(|p| p.id == id)
    }
}

/// Process-wide table of backends and the operations they implement
pub struct PluginRegistry {
    state: RwLock<Option<RegistryState>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Create an uninitialized registry
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    fn not_ready() -> AccelError {
        AccelError::BackendNotReady {
            subsystem: "plugin registry",
        }
    }

    /// Prepare empty plugin and operation tables; idempotent
    pub fn bootstrap(&self) {
        let mut state = self.state.write();
        if state.is_none() {
            *state = Some(RegistryState::new());
            debug!("plugin registry bootstrapped");
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.state.read().is_some()
    }

    // -------------------------------------------------------------------------
    // Plugins
    // -------------------------------------------------------------------------

    /// Link a plugin into the registry
    ///
    /// Does not call `init`; the loader does that once registration succeeds
    /// (see [`PluginRegistry::init_plugin`]).
    pub fn register_plugin(&self, plugin: Plugin) -> AccelResult<PluginId> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or_else(Self::not_ready)?;

        let info = plugin
            .info()
            .ok_or_else(|| AccelError::InvalidArgument("plugin descriptor is missing".into()))?;
        info.validate()?;

        if state.plugins.iter().any(|p| p.plugin.name() == Some(&info.name)) {
            return Err(AccelError::AlreadyExists(format!(
                "plugin '{}' already registered",
                info.name
            )));
        }

        let id = state.next_id;
        state.next_id += 1;
        info!(plugin = %info.name, kind = %info.kind, id, "registered plugin");
        state.plugins.push(RegisteredPlugin {
            id,
            plugin,
            ops: Vec::new(),
        });
        Ok(id)
    }

    /// Unlink a plugin, handing it back to the caller
    ///
    /// The plugin's operations leave the dispatch table with it. Calling
    /// `fini` and releasing the library is the caller's job
    /// ([`Plugin::finalize`]).
    pub fn unregister_plugin(&self, id: PluginId) -> AccelResult<Plugin> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or_else(Self::not_ready)?;

        let pos = state
            .plugins
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| AccelError::NotFound(format!("plugin {} is not registered", id)))?;

        let entry = state.plugins.remove(pos);
        for ty in &entry.ops {
            state.ops[ty.index()].retain(|op| op.owner != id);
        }
        debug!(plugin = ?entry.plugin.name(), id, "unregistered plugin");
        Ok(entry.plugin)
    }

    /// Run a registered plugin's `init`, letting it register its operations
    pub fn init_plugin(&self, id: PluginId) -> AccelResult<()> {
        // the lock is released before init runs; init registers back into us
        let (name, init) = {
            let guard = self.state.read();
            let state = guard.as_ref().ok_or_else(Self::not_ready)?;
            let info = state
                .find(id)
                .ok_or_else(|| AccelError::NotFound(format!("plugin {} is not registered", id)))?
                .info()?;
            (info.name.clone(), info.init.clone())
        };

        match init {
            Some(init) => init(&OpRegistrar { registry: self, owner: id })
                .map_err(|e| AccelError::backend(&name, e)),
            None => Ok(()),
        }
    }

    pub fn is_registered(&self, id: PluginId) -> bool {
        self.state
            .read()
            .as_ref()
            .is_some_and(|state| state.find(id).is_some())
    }

    /// Handle of the plugin registered under `name`
    pub fn find_by_name(&self, name: &str) -> Option<PluginId> {
        let guard = self.state.read();
        let state = guard.as_ref()?;
        state
            .plugins
            .iter()
            .find(|p| p.plugin.name() == Some(name))
            .map(|p| p.id)
    }

    /// Information about all registered plugins, in registration order
    pub fn list_plugins(&self) -> Vec<PluginSummary> {
        let guard = self.state.read();
        let Some(state) = guard.as_ref() else {
            return Vec::new();
        };

        state
            .plugins
            .iter()
            .filter_map(|p| {
                let info = p.plugin.info()?;
                Some(PluginSummary {
                    id: p.id,
                    name: info.name.clone(),
                    version: info.version.clone(),
                    kind: info.kind,
                    delegating: info.session_hooks.is_some(),
                    dynamic: p.plugin.has_library(),
                    ops: p.ops.clone(),
                })
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Register one operation implementation
    pub fn register_plugin_function(&self, op: PluginOp) -> AccelResult<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or_else(Self::not_ready)?;

        let ty = op.op_type();
        let owner = state
            .plugins
            .iter_mut()
            .find(|p| p.id == op.owner)
            .ok_or_else(|| {
                AccelError::InvalidArgument(format!(
                    "operation {} owned by unregistered plugin {}",
                    ty, op.owner
                ))
            })?;
        let kind = owner.info()?.kind;

        owner.ops.push(ty);
        state.ops[ty.index()].push(OpEntry {
            owner: op.owner,
            kind,
            func: op.func,
        });
        debug!(op = %ty, owner = op.owner, "registered operation");
        Ok(())
    }

    /// Register several operations
    ///
    /// Each element is checked and applied on its own: a failure on one
    /// element leaves the earlier ones registered.
    pub fn register_plugin_functions(
        &self,
        ops: impl IntoIterator<Item = PluginOp>,
    ) -> AccelResult<()> {
        for op in ops {
            self.register_plugin_function(op)?;
        }
        Ok(())
    }

    /// Resolve an operation, reporting which plugin implements it
    pub fn resolve_op(&self, ty: OpType, preferred: Option<BackendKind>) -> Option<ResolvedOp> {
        let guard = self.state.read();
        let state = guard.as_ref()?;
        let candidates = &state.ops[ty.index()];

        let entry = preferred
            .and_then(|kind| candidates.iter().find(|op| op.kind == kind))
            .or_else(|| candidates.first())?;

        let plugin_name = state
            .find(entry.owner)
            .and_then(|p| p.plugin.name())
            .unwrap_or_default()
            .to_string();

        Some(ResolvedOp {
            plugin: entry.owner,
            plugin_name,
            kind: entry.kind,
            func: entry.func.clone(),
        })
    }

    /// Callable implementing `ty`, preferring backends of kind `preferred`
    ///
    /// `None` when nothing implements the type; that is the dispatch failure
    /// signal.
    pub fn get_plugin_op(&self, ty: OpType, preferred: Option<BackendKind>) -> Option<OpFn> {
        self.resolve_op(ty, preferred).map(|resolved| resolved.func)
    }

    /// Names of the plugins implementing `ty`, in registration order
    ///
    /// An empty answer is not an error at this layer.
    pub fn get_available_plugins(&self, ty: OpType) -> AccelResult<Vec<String>> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or_else(Self::not_ready)?;

        let names: Vec<String> = state.ops[ty.index()]
            .iter()
            .filter_map(|op| state.find(op.owner))
            .filter_map(|p| p.plugin.name())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            info!(op = %ty, "no plugin implements operation");
        }
        for name in &names {
            info!(op = %ty, plugin = %name, "available implementation");
        }
        Ok(names)
    }

    // -------------------------------------------------------------------------
    // Delegation
    // -------------------------------------------------------------------------

    /// First registered remote backend exposing session hooks
    pub fn delegating_plugin(&self) -> Option<(PluginId, String, Arc<dyn SessionHooks>)> {
        let guard = self.state.read();
        let state = guard.as_ref()?;
        state.plugins.iter().find_map(|p| {
            let info = p.plugin.info()?;
            match (&info.session_hooks, info.kind) {
                (Some(hooks), BackendKind::Remote) => {
                    Some((p.id, info.name.clone(), Arc::clone(hooks)))
                }
                _ => None,
            }
        })
    }

    /// Session hooks of a specific registered plugin
    pub fn session_hooks(&self, id: PluginId) -> Option<(String, Arc<dyn SessionHooks>)> {
        let guard = self.state.read();
        let info = guard.as_ref()?.find(id)?.plugin.info()?;
        let hooks = info.session_hooks.as_ref()?;
        Some((info.name.clone(), Arc::clone(hooks)))
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Finalize every registered plugin and clear all tables
    ///
    /// A failing `fini` is logged and does not stop the others. Returns the
    /// number of plugins finalized.
    pub fn shutdown(&self) -> usize {
        let Some(state) = self.state.write().take() else {
            return 0;
        };
        let RegistryState { plugins, ops, .. } = state;

        // callables go before the libraries they point into
        drop(ops);

        let count = plugins.len();
        for entry in plugins {
            let name = entry.plugin.name().unwrap_or_default().to_string();
            match entry.plugin.finalize() {
                Ok(()) => debug!(plugin = %name, "plugin finalized"),
                Err(e) => error!(plugin = %name, error = %e, "plugin fini failed"),
            }
        }

        if count > 0 {
            info!(count, "plugin registry shut down");
        }
        count
    }
}
