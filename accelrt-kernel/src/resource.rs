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

//! Resource Registry
//!
//! Resources are type-tagged opaque assets (models, shared objects) owned by
//! the caller that created them. The registry hands out IDs from its own
//! pool, indexes live resources per type and runs each resource's
//! destructor exactly once: on explicit destroy or at cleanup.
//!
//! ## Teardown order
//!
//! ```text
//!   unlink from index (lock held)
//!        │
//!   destructor(payload)       ◄── lock released; failure only logged
//!        │
//!   remove scratch directory
//!        │
//!   release ID (lock held)
//! ```

use crate::error::{AccelError, AccelResult};
use crate::id_pool::{Id, IdPool, INVALID_ID};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resource identifier, disjoint from session IDs
pub type ResourceId = Id;

/// Default capacity of the resource pool
pub const DEFAULT_MAX_RESOURCES: u32 = 2048;

/// Number of resource types
pub const RESOURCE_TYPE_COUNT: usize = 5;

/// Kind of asset a resource wraps
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    TfModel = 0,
    TfSavedModel = 1,
    CaffeModel = 2,
    SharedObject = 3,
    TorchModel = 4,
}

impl ResourceType {
    pub const ALL: [ResourceType; RESOURCE_TYPE_COUNT] = [
        ResourceType::TfModel,
        ResourceType::TfSavedModel,
        ResourceType::CaffeModel,
        ResourceType::SharedObject,
        ResourceType::TorchModel,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceType::TfModel => "tf-model",
            ResourceType::TfSavedModel => "tf-saved-model",
            ResourceType::CaffeModel => "caffe-model",
            ResourceType::SharedObject => "shared-object",
            ResourceType::TorchModel => "torch-model",
        }
    }

    /// Whether the resource holds a model usable for inference
    pub fn is_model(self) -> bool {
        !matches!(self, ResourceType::SharedObject)
    }
}

impl TryFrom<u32> for ResourceType {
    type Error = AccelError;

    fn try_from(raw: u32) -> AccelResult<Self> {
        ResourceType::ALL
            .get(raw as usize)
            .copied()
            .ok_or_else(|| {
                AccelError::InvalidArgument(format!("resource type {} out of range", raw))
            })
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Resource
// ============================================================================

/// Type-erased resource payload
pub type Payload = Arc<dyn Any + Send + Sync>;

type Destructor = Box<dyn FnOnce(Payload) -> AccelResult<()> + Send>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A live (or destroyed) resource
pub struct Resource {
    id: ResourceId,
    serial: u64,
    kind: ResourceType,
    payload: Payload,
    destructor: Mutex<Option<Destructor>>,
    rundir: Mutex<Option<PathBuf>>,
    live: AtomicBool,
}

impl Resource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> ResourceType {
        self.kind
    }

    /// Process-unique identity; unlike the ID it is never reused
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Payload downcast to its concrete type
    pub fn payload<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }

    /// False once the resource has been destroyed
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Private scratch directory, if one was created
    pub fn rundir(&self) -> Option<PathBuf> {
        self.rundir.lock().clone()
    }

    /// Run the destructor and drop the scratch directory; at most once
    fn teardown(&self) {
        let destructor = self.destructor.lock().take();
        if let Some(destructor) = destructor {
            if let Err(e) = destructor(Arc::clone(&self.payload)) {
                warn!(
                    resource = self.id,
                    kind = %self.kind,
                    error = %e,
                    "resource destructor failed"
                );
            }
        }

        if let Some(dir) = self.rundir.lock().take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(
                    resource = self.id,
                    path = %dir.display(),
                    error = %e,
                    "could not remove resource directory"
                );
            }
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("live", &self.is_live())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

struct ResourceTable {
    ids: IdPool,
    /// Live resources per type
    live: Vec<BTreeMap<ResourceId, Arc<Resource>>>,
    /// Base for per-resource scratch directories
    base: Option<PathBuf>,
}

impl ResourceTable {
    fn find(&self, id: ResourceId) -> Option<&Arc<Resource>> {
        self.live.iter().find_map(|by_type| by_type.get(&id))
    }

    /// Whether this exact resource, not just its ID, is linked
    fn holds(&self, resource: &Resource) -> bool {
        self.live[resource.kind.index()]
            .get(&resource.id)
            .is_some_and(|stored| std::ptr::eq(Arc::as_ptr(stored), resource))
    }
}

/// Process-wide table of live resources
pub struct ResourceRegistry {
    capacity: u32,
    state: Mutex<Option<ResourceTable>>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RESOURCES)
    }

    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity,
            state: Mutex::new(None),
        }
    }

    fn not_ready() -> AccelError {
        AccelError::BackendNotReady {
            subsystem: "resource registry",
        }
    }

    /// Create the pool and index; idempotent
    ///
    /// `rundir` is the base under which per-resource directories are made.
    pub fn bootstrap(&self, rundir: Option<&Path>) -> AccelResult<()> {
        let mut state = self.state.lock();
        if state.is_none() {
            *state = Some(ResourceTable {
                ids: IdPool::new(self.capacity)?,
                live: (0..RESOURCE_TYPE_COUNT).map(|_| BTreeMap::new()).collect(),
                base: rundir.map(Path::to_path_buf),
            });
            debug!(capacity = self.capacity, "resource registry bootstrapped");
        }
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Register a new resource
    ///
    /// `destructor` receives the payload back when the resource is
    /// destroyed.
    pub fn resource_new<T, F>(
        &self,
        kind: ResourceType,
        payload: T,
        destructor: F,
    ) -> AccelResult<Arc<Resource>>
    where
        T: Any + Send + Sync,
        F: FnOnce(Arc<T>) -> AccelResult<()> + Send + 'static,
    {
        let destructor: Destructor =
            Box::new(move |payload: Payload| match payload.downcast::<T>() {
                Ok(payload) => destructor(payload),
                Err(_) => Err(AccelError::InvalidArgument("resource payload type changed".into())),
            });

        let mut guard = self.state.lock();
        let table = guard.as_mut().ok_or_else(Self::not_ready)?;
        let id = table
            .ids
            .acquire()
            .ok_or(AccelError::ResourceExhausted { pool: "resources" })?;

        let resource = Arc::new(Resource {
            id,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            kind,
            payload: Arc::new(payload),
            destructor: Mutex::new(Some(destructor)),
            rundir: Mutex::new(None),
            live: AtomicBool::new(true),
        });
        table.live[kind.index()].insert(id, Arc::clone(&resource));

        debug!(resource = id, %kind, "resource created");
        Ok(resource)
    }

    /// Destroy a live resource
    ///
    /// A failing destructor is logged; the ID is released regardless. A
    /// stale handle whose ID has since been reissued is rejected and leaves
    /// the new holder alone.
    pub fn resource_destroy(&self, resource: &Resource) -> AccelResult<()> {
        let unlinked = {
            let mut guard = self.state.lock();
            let table = guard.as_mut().ok_or_else(Self::not_ready)?;
            if resource.is_live() && table.holds(resource) {
                table.live[resource.kind.index()].remove(&resource.id)
            } else {
                None
            }
        };
        let Some(unlinked) = unlinked else {
            return Err(AccelError::InvalidArgument(format!(
                "resource {} is not live",
                resource.id
            )));
        };

        unlinked.live.store(false, Ordering::Release);
        unlinked.teardown();

        let mut guard = self.state.lock();
        if let Some(table) = guard.as_mut() {
            table.ids.release(unlinked.id)?;
        }
        debug!(resource = unlinked.id, "resource destroyed");
        Ok(())
    }

    /// Live resource with the given ID
    pub fn resource_get_by_id(&self, id: ResourceId) -> AccelResult<Arc<Resource>> {
        if id == INVALID_ID {
            return Err(AccelError::InvalidArgument("resource id 0 is reserved".into()));
        }
        let guard = self.state.lock();
        let table = guard.as_ref().ok_or_else(Self::not_ready)?;
        table
            .find(id)
            .cloned()
            .ok_or_else(|| AccelError::InvalidArgument(format!("no live resource with id {}", id)))
    }

    /// Create the resource's private directory; idempotent
    pub fn resource_create_rundir(&self, resource: &Resource) -> AccelResult<PathBuf> {
        let base = {
            let guard = self.state.lock();
            let table = guard.as_ref().ok_or_else(Self::not_ready)?;
            if !table.holds(resource) {
                return Err(AccelError::InvalidArgument(format!(
                    "resource {} is not live",
                    resource.id
                )));
            }
            table
                .base
                .clone()
                .ok_or_else(|| AccelError::NotFound("no run directory configured".into()))?
        };

        let mut rundir = resource.rundir.lock();
        if let Some(existing) = rundir.as_ref() {
            return Ok(existing.clone());
        }
        // teardown clears `live` before taking this lock
        if !resource.is_live() {
            return Err(AccelError::InvalidArgument(format!(
                "resource {} was destroyed",
                resource.id
            )));
        }

        let path = base.join(format!("resource.{}", resource.id));
        create_private_dir(&path)?;
        debug!(
            resource = resource.id,
            path = %path.display(),
            "created resource directory"
        );
        *rundir = Some(path.clone());
        Ok(path)
    }

    pub fn live_resources(&self) -> usize {
        self.state
            .lock()
            .as_ref()
            .map_or(0, |table| table.live.iter().map(BTreeMap::len).sum())
    }

    /// IDs of live resources of one type, ascending
    pub fn live_of_type(&self, kind: ResourceType) -> Vec<ResourceId> {
        self.state
            .lock()
            .as_ref()
            .map(|table| table.live[kind.index()].keys().copied().collect())
            .unwrap_or_default()
    }

    /// Destroy every live resource and release the pool
    ///
    /// Returns the number of resources destroyed.
    pub fn cleanup(&self) -> usize {
        let Some(table) = self.state.lock().take() else {
            return 0;
        };

        let mut count = 0;
        for by_type in table.live {
            for (_, resource) in by_type {
                resource.live.store(false, Ordering::Release);
                resource.teardown();
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, "destroyed live resources at cleanup");
        }
        table.ids.destroy();
        count
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> AccelResult<()> {
    use std::os::unix::fs::DirBuilderExt;

    match std::fs::DirBuilder::new().mode(0o700).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> AccelResult<()> {
    match std::fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn registry(capacity: u32) -> ResourceRegistry {
        let registry = ResourceRegistry::with_capacity(capacity);
        registry.bootstrap(None).unwrap();
        registry
    }

    #[test]
    fn test_type_range() {
        assert_eq!(ResourceType::try_from(3).unwrap(), ResourceType::SharedObject);
        assert!(matches!(
            ResourceType::try_from(RESOURCE_TYPE_COUNT as u32),
            Err(AccelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_and_lookup() {
        let registry = registry(8);
        let res = registry
            .resource_new(ResourceType::TfModel, String::from("model"), |_| Ok(()))
            .unwrap();
        assert_eq!(res.id(), 1);

        let found = registry.resource_get_by_id(res.id()).unwrap();
        assert_eq!(found.kind(), ResourceType::TfModel);
        assert_eq!(found.payload::<String>().unwrap().as_str(), "model");
        assert!(found.payload::<u32>().is_none());
    }

    #[test]
    fn test_get_by_invalid_id() {
        let registry = registry(2);
        assert!(matches!(
            registry.resource_get_by_id(0),
            Err(AccelError::InvalidArgument(_))
        ));
        assert!(registry.resource_get_by_id(2).is_err());
    }

    #[test]
    fn test_destroy_releases_id() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let registry = registry(2);

        let counter = Arc::clone(&destroyed);
        let res = registry
            .resource_new(ResourceType::SharedObject, 7u64, move |payload| {
                assert_eq!(*payload, 7);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let id = res.id();

        registry.resource_destroy(&res).unwrap();
        assert!(!res.is_live());
        assert!(registry.resource_get_by_id(id).is_err());
        assert!(matches!(
            registry.resource_destroy(&res),
            Err(AccelError::InvalidArgument(_))
        ));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        let again = registry
            .resource_new(ResourceType::TfModel, (), |_| Ok(()))
            .unwrap();
        assert_eq!(again.id(), id);
    }

    #[test]
    fn test_stale_handle_spares_reissued_id() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let registry = registry(4);

        let old = registry
            .resource_new(ResourceType::TfModel, (), |_| Ok(()))
            .unwrap();
        registry.resource_destroy(&old).unwrap();

        let counter = Arc::clone(&destroyed);
        let new = registry
            .resource_new(ResourceType::TfModel, (), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(new.id(), old.id());
        assert_ne!(new.serial(), old.serial());

        assert!(matches!(
            registry.resource_destroy(&old),
            Err(AccelError::InvalidArgument(_))
        ));
        assert!(new.is_live());
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        assert!(registry.resource_get_by_id(new.id()).is_ok());

        registry.resource_destroy(&new).unwrap();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rundir_refused_for_destroyed_resource() {
        let base = TempDir::new().unwrap();
        let registry = ResourceRegistry::new();
        registry.bootstrap(Some(base.path())).unwrap();

        let old = registry
            .resource_new(ResourceType::SharedObject, (), |_| Ok(()))
            .unwrap();
        registry.resource_destroy(&old).unwrap();
        let _new = registry
            .resource_new(ResourceType::SharedObject, (), |_| Ok(()))
            .unwrap();

        assert!(matches!(
            registry.resource_create_rundir(&old),
            Err(AccelError::InvalidArgument(_))
        ));
        assert!(old.rundir().is_none());
        assert!(!base.path().join("resource.1").exists());
    }

    #[test]
    fn test_failing_destructor_still_releases() {
        let registry = registry(1);
        let res = registry
            .resource_new(ResourceType::CaffeModel, (), |_| {
                Err(AccelError::Unsupported("busy".into()))
            })
            .unwrap();
        assert!(registry.resource_destroy(&res).is_ok());
        assert!(registry
            .resource_new(ResourceType::CaffeModel, (), |_| Ok(()))
            .is_ok());
    }

    #[test]
    fn test_exhaustion() {
        let registry = registry(1);
        let _first = registry
            .resource_new(ResourceType::TfModel, (), |_| Ok(()))
            .unwrap();
        assert!(matches!(
            registry.resource_new(ResourceType::TfModel, (), |_| Ok(())),
            Err(AccelError::ResourceExhausted { .. })
        ));
    }

    #[test]
    fn test_rundir_lifecycle() {
        let base = TempDir::new().unwrap();
        let registry = ResourceRegistry::new();
        registry.bootstrap(Some(base.path())).unwrap();

        let res = registry
            .resource_new(ResourceType::TorchModel, (), |_| Ok(()))
            .unwrap();
        let dir = registry.resource_create_rundir(&res).unwrap();
        assert_eq!(dir, base.path().join("resource.1"));
        assert!(dir.is_dir());
        assert_eq!(registry.resource_create_rundir(&res).unwrap(), dir);

        registry.resource_destroy(&res).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_rundir_without_base() {
        let registry = registry(1);
        let res = registry
            .resource_new(ResourceType::TorchModel, (), |_| Ok(()))
            .unwrap();
        assert!(matches!(
            registry.resource_create_rundir(&res),
            Err(AccelError::NotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_runs_each_destructor_once() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let registry = registry(16);

        let mut handles = Vec::new();
        for kind in ResourceType::ALL.into_iter().rev() {
            let counter = Arc::clone(&destroyed);
            handles.push(
                registry
                    .resource_new(kind, (), move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap(),
            );
        }
        registry.resource_destroy(&handles[0]).unwrap();

        assert_eq!(registry.cleanup(), RESOURCE_TYPE_COUNT - 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), RESOURCE_TYPE_COUNT);
        assert!(handles.iter().all(|r| !r.is_live()));
        assert_eq!(registry.cleanup(), 0);
    }
}
