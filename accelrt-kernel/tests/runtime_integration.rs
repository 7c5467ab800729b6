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

//! Runtime integration tests
//!
//! Drives a bootstrapped runtime through in-test backends: a generic and an
//! FPGA backend competing for the same operations, and a remote backend
//! recording the session calls delegated to it.

use accelrt_kernel::{
    ops, AccelError, BackendKind, OpFn, OpType, PluginInfo, ResourceId, ResourceType, Runtime,
    RuntimeConfig, SessionFlags, SessionHooks, SessionId, SessionMode, Tensor,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn runtime() -> (TempDir, Runtime) {
    let root = tempfile::tempdir().unwrap();
    let runtime = Runtime::bootstrap(
        RuntimeConfig::default()
            .with_rundir_root(root.path())
            .with_max_sessions(64)
            .with_max_resources(64),
    )
    .unwrap();
    (root, runtime)
}

/// Backend whose classification label names the backend
fn labelled(name: &'static str, kind: BackendKind) -> PluginInfo {
    PluginInfo::new(name, kind).with_init(move |ops| {
        ops.register(OpFn::image_classify(move |_, _| Ok(name.to_string())))
    })
}

#[derive(Default)]
struct RemoteHooks {
    init: AtomicUsize,
    update: AtomicUsize,
    free: AtomicUsize,
    register: AtomicUsize,
    unregister: AtomicUsize,
}

impl RemoteHooks {
    fn total(&self) -> usize {
        [&self.init, &self.update, &self.free, &self.register, &self.unregister]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }
}

impl SessionHooks for RemoteHooks {
    fn sess_init(&self, _: SessionId, _: SessionFlags) -> accelrt_kernel::AccelResult<()> {
        self.init.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sess_update(&self, _: SessionId, _: SessionFlags) -> accelrt_kernel::AccelResult<()> {
        self.update.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sess_free(&self, _: SessionId) -> accelrt_kernel::AccelResult<()> {
        self.free.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sess_register(&self, _: SessionId, _: ResourceId) -> accelrt_kernel::AccelResult<()> {
        self.register.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sess_unregister(&self, _: SessionId, _: ResourceId) -> accelrt_kernel::AccelResult<()> {
        self.unregister.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn install_remote(runtime: &Runtime) -> Arc<RemoteHooks> {
    let hooks = Arc::new(RemoteHooks::default());
    runtime
        .register_plugin(
            PluginInfo::new("virtio", BackendKind::Remote)
                .with_session_hooks(Arc::clone(&hooks) as Arc<dyn SessionHooks>),
        )
        .unwrap();
    hooks
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_hint_selects_backend() {
    let (_root, runtime) = runtime();
    runtime.register_plugin(labelled("generic", BackendKind::Generic)).unwrap();
    runtime.register_plugin(labelled("fpga", BackendKind::Fpga)).unwrap();

    let fpga = runtime
        .sessions()
        .sess_init(SessionFlags::with_hint(BackendKind::Fpga))
        .unwrap();
    let plain = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();
    let gpu = runtime
        .sessions()
        .sess_init(SessionFlags::with_hint(BackendKind::Gpu))
        .unwrap();

    assert_eq!(ops::image_classify(&runtime, &fpga, b"img").unwrap(), "fpga");
    assert_eq!(ops::image_classify(&runtime, &plain, b"img").unwrap(), "generic");
    assert_eq!(ops::image_classify(&runtime, &gpu, b"img").unwrap(), "generic");

    assert_eq!(
        ops::get_plugins(&runtime, OpType::ImageClassify).unwrap(),
        vec!["generic", "fpga"]
    );
}

#[test]
fn test_unregistered_backend_stops_serving() {
    let (_root, runtime) = runtime();
    let generic = runtime.register_plugin(labelled("generic", BackendKind::Generic)).unwrap();
    let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();

    let plugin = runtime.plugins().unregister_plugin(generic).unwrap();
    plugin.finalize().unwrap();

    assert!(matches!(
        ops::image_classify(&runtime, &sess, b"img"),
        Err(AccelError::Unsupported(_))
    ));
    assert!(matches!(
        runtime.plugins().unregister_plugin(generic),
        Err(AccelError::NotFound(_))
    ));
}

#[test]
fn test_fpga_ops_unsupported_without_backend() {
    let (_root, runtime) = runtime();
    let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();

    let (a, b) = ([1.0f32; 4], [2.0f32; 4]);
    let (mut c, mut d) = ([0.0f32; 4], [0.0f32; 4]);
    let mut ints = [0i32; 4];

    for result in [
        ops::vector_add(&runtime, &sess, &a, &b, &mut c),
        ops::matmul(&runtime, &sess, &a, &b, &mut c),
        ops::parallel(&runtime, &sess, &a, &b, &mut c, &mut d),
        ops::array_copy(&runtime, &sess, &[1, 2, 3, 4], &mut ints),
    ] {
        assert!(matches!(result, Err(AccelError::Unsupported(_))));
    }
}

// ============================================================================
// Delegation
// ============================================================================

#[test]
fn test_delegated_session_mirrors_lifecycle() {
    let (_root, runtime) = runtime();
    let mut sess = runtime.sessions().sess_init(SessionFlags(1)).unwrap();
    let hooks = install_remote(&runtime);

    let res = runtime
        .resources()
        .resource_new(ResourceType::SharedObject, (), |_| Ok(()))
        .unwrap();

    runtime
        .sessions()
        .sess_update(&mut sess, SessionFlags(2) | SessionFlags::REMOTE)
        .unwrap();
    runtime.sessions().sess_register(&sess, &res).unwrap();
    runtime.sessions().sess_unregister(&sess, &res).unwrap();
    runtime.sessions().sess_free(sess).unwrap();

    assert_eq!(hooks.total(), 4);
    assert_eq!(hooks.init.load(Ordering::SeqCst), 0);
    assert_eq!(hooks.update.load(Ordering::SeqCst), 1);
    assert_eq!(hooks.free.load(Ordering::SeqCst), 1);
}

#[test]
fn test_delegated_from_creation() {
    let (_root, runtime) = runtime();
    let hooks = install_remote(&runtime);

    let mut sess = runtime.sessions().sess_init(SessionFlags::REMOTE).unwrap();
    assert!(matches!(
        runtime.sessions().sess_mode(&sess).unwrap(),
        SessionMode::Delegated { .. }
    ));
    assert_eq!(hooks.init.load(Ordering::SeqCst), 1);

    runtime.sessions().sess_update(&mut sess, SessionFlags::NONE).unwrap();
    assert_eq!(runtime.sessions().sess_mode(&sess).unwrap(), SessionMode::Local);
    assert_eq!(hooks.update.load(Ordering::SeqCst), 0);

    runtime.sessions().sess_free(sess).unwrap();
    assert_eq!(hooks.free.load(Ordering::SeqCst), 0);
}

#[test]
fn test_local_session_never_delegates() {
    let (_root, runtime) = runtime();
    let hooks = install_remote(&runtime);

    let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();
    let res = runtime
        .resources()
        .resource_new(ResourceType::TfModel, (), |_| Ok(()))
        .unwrap();
    runtime.sessions().sess_register(&sess, &res).unwrap();
    runtime.sessions().sess_free(sess).unwrap();

    assert_eq!(hooks.total(), 0);
    assert!(res.is_live());
}

// ============================================================================
// Resources and teardown
// ============================================================================

#[test]
fn test_resource_lookup_and_destroy() {
    let (_root, runtime) = runtime();
    let res = runtime
        .resources()
        .resource_new(ResourceType::TorchModel, vec![1u8, 2, 3], |_| Ok(()))
        .unwrap();

    let found = runtime.resources().resource_get_by_id(res.id()).unwrap();
    assert_eq!(found.kind(), ResourceType::TorchModel);
    assert_eq!(found.payload::<Vec<u8>>().unwrap().len(), 3);

    runtime.resources().resource_destroy(&res).unwrap();
    assert!(runtime.resources().resource_get_by_id(res.id()).is_err());
}

#[test]
fn test_reused_resource_id_is_not_registered() {
    let (_root, runtime) = runtime();
    runtime
        .register_plugin(PluginInfo::new("cpu", BackendKind::Cpu).with_init(|ops| {
            ops.register(OpFn::tensor_inference(|_, _, inputs| Ok(inputs.to_vec())))
        }))
        .unwrap();
    let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();

    let old = runtime
        .resources()
        .resource_new(ResourceType::TfModel, (), |_| Ok(()))
        .unwrap();
    runtime.sessions().sess_register(&sess, &old).unwrap();
    runtime.resources().resource_destroy(&old).unwrap();

    let other = runtime
        .resources()
        .resource_new(ResourceType::TorchModel, (), |_| Ok(()))
        .unwrap();
    assert_eq!(other.id(), old.id());
    assert!(!runtime.sessions().sess_has_resource(&sess, &other));

    let input = Tensor::new(vec![1], vec![1.0]).unwrap();
    assert!(matches!(
        ops::tensor_inference(&runtime, &sess, &other, &[input.clone()]),
        Err(AccelError::InvalidArgument(_))
    ));

    runtime.sessions().sess_register(&sess, &other).unwrap();
    assert_eq!(
        ops::tensor_inference(&runtime, &sess, &other, &[input]).unwrap().len(),
        1
    );
}

#[test]
fn test_shutdown_runs_each_destructor_once() {
    let (_root, runtime) = runtime();
    let destroyed = Arc::new(AtomicUsize::new(0));

    let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();
    for kind in [
        ResourceType::SharedObject,
        ResourceType::TfModel,
        ResourceType::SharedObject,
        ResourceType::CaffeModel,
    ] {
        let counter = Arc::clone(&destroyed);
        let res = runtime
            .resources()
            .resource_new(kind, (), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        runtime.resources().resource_create_rundir(&res).unwrap();
        runtime.sessions().sess_register(&sess, &res).unwrap();
    }

    let rundir = runtime.rundir().to_path_buf();
    runtime.shutdown();
    runtime.shutdown();

    assert_eq!(destroyed.load(Ordering::SeqCst), 4);
    assert!(!rundir.exists());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_sessions_get_distinct_ids() {
    let (_root, runtime) = runtime();
    let runtime = Arc::new(runtime);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                (0..8)
                    .map(|_| runtime.sessions().sess_init(SessionFlags::NONE).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let sessions: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let ids: HashSet<_> = sessions.iter().map(|s| s.id()).collect();
    assert_eq!(ids.len(), 64);
    assert!(ids.iter().all(|id| (1..=64).contains(id)));
    assert!(matches!(
        runtime.sessions().sess_init(SessionFlags::NONE),
        Err(AccelError::ResourceExhausted { .. })
    ));
}

#[test]
fn test_concurrent_resource_churn() {
    let (_root, runtime) = runtime();
    let runtime = Arc::new(runtime);
    let destroyed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            let destroyed = Arc::clone(&destroyed);
            thread::spawn(move || {
                for _ in 0..100 {
                    let counter = Arc::clone(&destroyed);
                    let res = runtime
                        .resources()
                        .resource_new(ResourceType::SharedObject, (), move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                    runtime.resources().resource_destroy(&res).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(destroyed.load(Ordering::SeqCst), 400);
    assert_eq!(runtime.resources().live_resources(), 0);
}
