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

//! Session Registry and Delegation
//!
//! A session is a client context: an ID from the session pool, the flags
//! it was opened with, and the set of resources associated with it.
//!
//! ## Delegation
//!
//! Flags with [`SessionFlags::REMOTE`] set put the session in
//! [`SessionMode::Delegated`]: every lifecycle and association call is
//! mirrored to the first registered remote backend exposing
//! [`SessionHooks`]. The local bookkeeping is kept either way, so a session
//! answers membership queries identically in both modes.
//!
//! ```text
//!            sess_update(REMOTE)
//!   Local ─────────────────────────► Delegated { plugin }
//!     ▲                                   │
//!     └──────── sess_update(local) ───────┘
//! ```
//!
//! Hooks run with the table lock released. A failing hook surfaces as
//! [`AccelError::Backend`]; `sess_free` still drops the local state.

use crate::error::{AccelError, AccelResult};
use crate::id_pool::{Id, IdPool};
use crate::plugin::{BackendKind, PluginId, PluginRegistry, SessionHooks};
use crate::resource::{Resource, ResourceId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Session identifier, disjoint from resource IDs
pub type SessionId = Id;

/// Default capacity of the session pool
pub const DEFAULT_MAX_SESSIONS: u32 = 1024;

// ============================================================================
// Flags
// ============================================================================

/// Session behaviour flags
///
/// The low byte is a backend-kind hint ([`BackendKind`] tag bits) used as
/// the preferred kind when dispatching operations. Bit 31 selects
/// delegation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionFlags(pub u32);

impl SessionFlags {
    pub const NONE: SessionFlags = SessionFlags(0);
    /// Mirror lifecycle calls to the delegating backend
    pub const REMOTE: SessionFlags = SessionFlags(1 << 31);
    const HINT_MASK: u32 = 0xff;

    /// Flags carrying a backend-kind hint
    pub fn with_hint(kind: BackendKind) -> Self {
        SessionFlags(kind.tag())
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_remote(self) -> bool {
        self.0 & Self::REMOTE.0 != 0
    }

    /// Preferred backend kind, if any
    pub fn hint(self) -> Option<BackendKind> {
        BackendKind::from_tag(self.0 & Self::HINT_MASK)
    }

    /// The flags with the delegation bit stripped, as handed to hooks
    pub fn local(self) -> Self {
        SessionFlags(self.0 & !Self::REMOTE.0)
    }
}

impl BitOr for SessionFlags {
    type Output = SessionFlags;

    fn bitor(self, rhs: Self) -> Self {
        SessionFlags(self.0 | rhs.0)
    }
}

impl From<u32> for SessionFlags {
    fn from(bits: u32) -> Self {
        SessionFlags(bits)
    }
}

impl fmt::Display for SessionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Handle of a live session
///
/// Not `Clone`: the handle is consumed by [`SessionRegistry::sess_free`].
/// A handle dropped without being freed keeps its slot until registry
/// cleanup.
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    flags: SessionFlags,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    /// Preferred backend kind for dispatch
    pub fn hint(&self) -> Option<BackendKind> {
        self.flags.hint()
    }
}

/// Where lifecycle calls of a session go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Local,
    Delegated { plugin: PluginId },
}

struct SessionEntry {
    flags: SessionFlags,
    mode: SessionMode,
    /// Associated resource IDs with the serial of the resource registered;
    /// an ID whose serial no longer matches belongs to a destroyed resource
    resources: BTreeMap<ResourceId, u64>,
}

impl SessionEntry {
    fn holds(&self, resource: &Resource) -> bool {
        self.resources.get(&resource.id()) == Some(&resource.serial())
    }
}

struct SessionTable {
    ids: IdPool,
    sessions: HashMap<SessionId, SessionEntry>,
}

// ============================================================================
// Registry
// ============================================================================

/// Process-wide table of sessions
pub struct SessionRegistry {
    plugins: Arc<PluginRegistry>,
    capacity: u32,
    state: Mutex<Option<SessionTable>>,
}

impl SessionRegistry {
    pub fn new(plugins: Arc<PluginRegistry>) -> Self {
        Self::with_capacity(plugins, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_capacity(plugins: Arc<PluginRegistry>, capacity: u32) -> Self {
        Self {
            plugins,
            capacity,
            state: Mutex::new(None),
        }
    }

    fn not_ready() -> AccelError {
        AccelError::BackendNotReady {
            subsystem: "session registry",
        }
    }

    fn not_live(id: SessionId) -> AccelError {
        AccelError::InvalidArgument(format!("session {} is not live", id))
    }

    /// Create the session pool and table; idempotent
    pub fn bootstrap(&self) -> AccelResult<()> {
        let mut state = self.state.lock();
        if state.is_none() {
            *state = Some(SessionTable {
                ids: IdPool::new(self.capacity)?,
                sessions: HashMap::new(),
            });
            debug!(capacity = self.capacity, "session registry bootstrapped");
        }
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Drop every live session and the pool
    ///
    /// Association sets are discarded without touching the resources, and
    /// no hook is called. Returns the number of sessions dropped.
    pub fn cleanup(&self) -> usize {
        let Some(table) = self.state.lock().take() else {
            return 0;
        };
        let count = table.sessions.len();
        if count > 0 {
            debug!(count, "dropping live sessions");
        }
        table.ids.destroy();
        count
    }

    /// Mode a set of flags selects, resolving the delegating backend
    fn mode_for(&self, flags: SessionFlags) -> AccelResult<SessionMode> {
        if !flags.is_remote() {
            return Ok(SessionMode::Local);
        }
        self.plugins
            .delegating_plugin()
            .map(|(plugin, _, _)| SessionMode::Delegated { plugin })
            .ok_or_else(|| AccelError::Unsupported("no delegating backend registered".into()))
    }

    fn hooks(&self, mode: SessionMode) -> AccelResult<Option<(String, Arc<dyn SessionHooks>)>> {
        match mode {
            SessionMode::Local => Ok(None),
            SessionMode::Delegated { plugin } => self
                .plugins
                .session_hooks(plugin)
                .map(Some)
                .ok_or_else(|| {
                    AccelError::NotFound(format!("delegating plugin {} is gone", plugin))
                }),
        }
    }

    fn mode_of(&self, id: SessionId) -> AccelResult<SessionMode> {
        let guard = self.state.lock();
        let table = guard.as_ref().ok_or_else(Self::not_ready)?;
        table
            .sessions
            .get(&id)
            .map(|entry| entry.mode)
            .ok_or_else(|| Self::not_live(id))
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Open a session
    pub fn sess_init(&self, flags: SessionFlags) -> AccelResult<Session> {
        let mode = self.mode_for(flags)?;
        let hooks = self.hooks(mode)?;

        let id = {
            let mut guard = self.state.lock();
            let table = guard.as_mut().ok_or_else(Self::not_ready)?;
            let id = table
                .ids
                .acquire()
                .ok_or(AccelError::ResourceExhausted { pool: "sessions" })?;
            table.sessions.insert(
                id,
                SessionEntry {
                    flags,
                    mode,
                    resources: BTreeMap::new(),
                },
            );
            id
        };

        if let Some((name, hooks)) = hooks {
            if let Err(e) = hooks.sess_init(id, flags.local()) {
                self.forget(id);
                return Err(AccelError::backend(&name, e));
            }
        }

        debug!(session = id, %flags, "session created");
        Ok(Session { id, flags })
    }

    /// Replace a session's flags, switching its mode if needed
    ///
    /// The delegating backend sees the update only when the new flags
    /// select delegation; a session going back to local is not mirrored. A
    /// failing hook leaves the session unchanged.
    pub fn sess_update(&self, session: &mut Session, flags: SessionFlags) -> AccelResult<()> {
        let current = self.mode_of(session.id)?;
        let next = match current {
            SessionMode::Delegated { .. } if flags.is_remote() => current,
            _ => self.mode_for(flags)?,
        };

        if let Some((name, hooks)) = self.hooks(next)? {
            hooks
                .sess_update(session.id, flags.local())
                .map_err(|e| AccelError::backend(&name, e))?;
        }

        let mut guard = self.state.lock();
        let table = guard.as_mut().ok_or_else(Self::not_ready)?;
        let entry = table
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| Self::not_live(session.id))?;
        entry.flags = flags;
        entry.mode = next;
        session.flags = flags;

        debug!(session = session.id, %flags, mode = ?next, "session updated");
        Ok(())
    }

    /// Close a session
    ///
    /// The delegated free runs first; the ID and association set are
    /// released even when it fails, and its error is returned afterwards.
    pub fn sess_free(&self, session: Session) -> AccelResult<()> {
        let mode = self.mode_of(session.id)?;

        let delegated = match self.hooks(mode) {
            Ok(Some((name, hooks))) => hooks
                .sess_free(session.id)
                .map_err(|e| AccelError::backend(&name, e)),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        self.forget(session.id);
        if let Err(e) = &delegated {
            warn!(session = session.id, error = %e, "delegated session free failed");
        } else {
            debug!(session = session.id, "session freed");
        }
        delegated
    }

    fn forget(&self, id: SessionId) {
        let mut guard = self.state.lock();
        if let Some(table) = guard.as_mut() {
            if table.sessions.remove(&id).is_some() {
                if let Err(e) = table.ids.release(id) {
                    warn!(session = id, error = %e, "could not release session ID");
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Resource association
    // -------------------------------------------------------------------------

    /// Associate a live resource with a session
    ///
    /// Registering an already-associated resource is not an error. A stale
    /// entry left by a destroyed resource with the same ID is replaced. The
    /// call is mirrored to the delegating backend; if that fails a freshly
    /// added association is rolled back.
    pub fn sess_register(&self, session: &Session, resource: &Resource) -> AccelResult<()> {
        if !resource.is_live() {
            return Err(AccelError::InvalidArgument(format!(
                "resource {} is not live",
                resource.id()
            )));
        }
        let rid = resource.id();
        let serial = resource.serial();

        let (mode, inserted) = {
            let mut guard = self.state.lock();
            let table = guard.as_mut().ok_or_else(Self::not_ready)?;
            let entry = table
                .sessions
                .get_mut(&session.id)
                .ok_or_else(|| Self::not_live(session.id))?;
            let inserted = !entry.holds(resource);
            entry.resources.insert(rid, serial);
            (entry.mode, inserted)
        };

        let mirrored = match self.hooks(mode) {
            Ok(Some((name, hooks))) => hooks
                .sess_register(session.id, rid)
                .map_err(|e| AccelError::backend(&name, e)),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = mirrored {
            if inserted {
                self.drop_association(session.id, rid, serial);
            }
            return Err(e);
        }

        debug!(
            session = session.id,
            resource = rid,
            kind = %resource.kind(),
            "resource registered"
        );
        Ok(())
    }

    /// Remove a resource from a session's association set
    ///
    /// Unregistering a resource that is not associated is a no-op and is
    /// not mirrored.
    pub fn sess_unregister(&self, session: &Session, resource: &Resource) -> AccelResult<()> {
        let rid = resource.id();

        let mode = {
            let mut guard = self.state.lock();
            let table = guard.as_mut().ok_or_else(Self::not_ready)?;
            let entry = table
                .sessions
                .get_mut(&session.id)
                .ok_or_else(|| Self::not_live(session.id))?;
            if !entry.holds(resource) {
                debug!(session = session.id, resource = rid, "resource not associated");
                return Ok(());
            }
            entry.resources.remove(&rid);
            entry.mode
        };

        if let Some((name, hooks)) = self.hooks(mode)? {
            hooks
                .sess_unregister(session.id, rid)
                .map_err(|e| AccelError::backend(&name, e))?;
        }

        debug!(session = session.id, resource = rid, "resource unregistered");
        Ok(())
    }

    fn drop_association(&self, id: SessionId, rid: ResourceId, serial: u64) {
        let mut guard = self.state.lock();
        if let Some(entry) = guard.as_mut().and_then(|t| t.sessions.get_mut(&id)) {
            if entry.resources.get(&rid) == Some(&serial) {
                entry.resources.remove(&rid);
            }
        }
    }

    /// Drop a destroyed resource from every session, without mirroring
    ///
    /// Returns the number of sessions it was associated with.
    pub fn forget_resource(&self, resource: &Resource) -> usize {
        let mut guard = self.state.lock();
        let Some(table) = guard.as_mut() else {
            return 0;
        };
        let mut count = 0;
        for entry in table.sessions.values_mut() {
            if entry.holds(resource) {
                entry.resources.remove(&resource.id());
                count += 1;
            }
        }
        count
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Whether `resource` is associated with `session`; never fails
    pub fn sess_has_resource(&self, session: &Session, resource: &Resource) -> bool {
        let guard = self.state.lock();
        guard
            .as_ref()
            .and_then(|table| table.sessions.get(&session.id))
            .is_some_and(|entry| entry.holds(resource))
    }

    /// Resource IDs associated with a session, ascending
    pub fn sess_resources(&self, session: &Session) -> AccelResult<Vec<ResourceId>> {
        let guard = self.state.lock();
        let table = guard.as_ref().ok_or_else(Self::not_ready)?;
        table
            .sessions
            .get(&session.id)
            .map(|entry| entry.resources.keys().copied().collect())
            .ok_or_else(|| Self::not_live(session.id))
    }

    /// Current mode of a session
    pub fn sess_mode(&self, session: &Session) -> AccelResult<SessionMode> {
        self.mode_of(session.id)
    }

    /// Stored flags of a session
    pub fn sess_flags(&self, session: &Session) -> AccelResult<SessionFlags> {
        let guard = self.state.lock();
        let table = guard.as_ref().ok_or_else(Self::not_ready)?;
        table
            .sessions
            .get(&session.id)
            .map(|entry| entry.flags)
            .ok_or_else(|| Self::not_live(session.id))
    }

    pub fn live_sessions(&self) -> usize {
        self.state
            .lock()
            .as_ref()
            .map_or(0, |table| table.sessions.len())
    }
}
