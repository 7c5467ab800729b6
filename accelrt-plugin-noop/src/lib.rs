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

//! No-op Backend for AccelRT
//!
//! Reference backend: implements every operation type without doing any
//! work, logging each call. Useful to exercise the dispatch path end to end
//! and as a template for real backends.
//!
//! ## Usage
//!
//! Built as a `cdylib`, the backend is picked up through the loader:
//!
//! ```text
//! ACCELRT_BACKENDS=target/release/libaccelrt_plugin_noop.so accelrt plugins
//! ```
//!
//! Linked in-process:
//!
//! ```rust,ignore
//! use accelrt_kernel::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::bootstrap(RuntimeConfig::from_env()?)?;
//! runtime.register_plugin(accelrt_plugin_noop::descriptor())?;
//! ```

use accelrt_kernel::{
    AccelResult, BackendKind, OpFn, OpRegistrar, OpType, PluginInfo, Session, Tensor,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Name the backend registers under
pub const PLUGIN_NAME: &str = "noop";

/// Label returned by image classification
pub const DUMMY_CLASSIFICATION: &str = "This is a dummy classification tag!";

/// Backend state shared by all registered callables
#[derive(Debug, Default)]
pub struct NoopBackend {
    calls: AtomicU64,
}

impl NoopBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations served so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn serve(&self, op: OpType, session: &Session) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        info!(op = %op, session = session.id(), "[noop] called");
    }

    /// Plugin descriptor backed by this instance
    pub fn descriptor(self: Arc<Self>) -> PluginInfo {
        PluginInfo::new(PLUGIN_NAME, BackendKind::Generic)
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_init(move |ops| Arc::clone(&self).register(ops))
            .with_fini(|| {
                info!("[noop] fini");
                Ok(())
            })
    }

    fn register(self: Arc<Self>, ops: &OpRegistrar<'_>) -> AccelResult<()> {
        let b = &self;
        ops.register_all([
            OpFn::noop({
                let b = Arc::clone(b);
                move |sess| {
                    b.serve(OpType::NoOp, sess);
                    Ok(())
                }
            }),
            OpFn::exec({
                let b = Arc::clone(b);
                move |sess, library, symbol, read, write| {
                    b.serve(OpType::Exec, sess);
                    info!(
                        library = %library.display(),
                        symbol,
                        read = read.len(),
                        write = write.len(),
                        "[noop] exec"
                    );
                    Ok(())
                }
            }),
            OpFn::exec_with_resource({
                let b = Arc::clone(b);
                move |sess, resource, symbol, _, _| {
                    b.serve(OpType::ExecWithResource, sess);
                    info!(resource = resource.id(), symbol, "[noop] exec with resource");
                    Ok(())
                }
            }),
            OpFn::array_copy({
                let b = Arc::clone(b);
                move |sess, src, _| {
                    b.serve(OpType::ArrayCopy, sess);
                    info!(len = src.len(), "[noop] array copy");
                    Ok(())
                }
            }),
            OpFn::vector_add({
                let b = Arc::clone(b);
                move |sess, a, _, _| {
                    b.serve(OpType::VectorAdd, sess);
                    info!(len = a.len(), "[noop] vector add");
                    Ok(())
                }
            }),
            OpFn::matmul({
                let b = Arc::clone(b);
                move |sess, a, _, _| {
                    b.serve(OpType::MatMul, sess);
                    info!(len = a.len(), "[noop] matmul");
                    Ok(())
                }
            }),
            OpFn::parallel({
                let b = Arc::clone(b);
                move |sess, a, _, _, _| {
                    b.serve(OpType::Parallel, sess);
                    info!(len = a.len(), "[noop] parallel");
                    Ok(())
                }
            }),
            OpFn::sgemm({
                let b = Arc::clone(b);
                move |sess, args, _| {
                    b.serve(OpType::BlasSgemm, sess);
                    info!(m = args.m, n = args.n, k = args.k, "[noop] sgemm");
                    Ok(())
                }
            }),
            OpFn::image_classify({
                let b = Arc::clone(b);
                move |sess, image| {
                    b.serve(OpType::ImageClassify, sess);
                    info!(bytes = image.len(), "[noop] image classify");
                    Ok(DUMMY_CLASSIFICATION.to_string())
                }
            }),
            OpFn::tensor_inference({
                let b = Arc::clone(b);
                move |sess, model, inputs| {
                    b.serve(OpType::TensorInference, sess);
                    info!(model = model.id(), inputs = inputs.len(), "[noop] tensor inference");
                    Ok(Vec::<Tensor>::new())
                }
            }),
        ])
    }
}

/// Descriptor of a fresh no-op backend
pub fn descriptor() -> PluginInfo {
    Arc::new(NoopBackend::new()).descriptor()
}

/// Loader entry point
#[no_mangle]
pub fn accelrt_plugin_descriptor() -> PluginInfo {
    descriptor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use accelrt_kernel::{PluginRegistry, SessionFlags, SessionRegistry};

    #[test]
    fn test_descriptor() {
        let info = descriptor();
        assert_eq!(info.name, PLUGIN_NAME);
        assert_eq!(info.kind, BackendKind::Generic);
        assert!(info.session_hooks.is_none());
    }

    #[test]
    fn test_registers_every_operation() {
        let registry = Arc::new(PluginRegistry::new());
        registry.bootstrap();
        let backend = Arc::new(NoopBackend::new());
        let id = registry
            .register_plugin(accelrt_kernel::Plugin::new(Arc::clone(&backend).descriptor()))
            .unwrap();
        registry.init_plugin(id).unwrap();

        for ty in OpType::ALL {
            assert!(registry.get_plugin_op(ty, None).is_some(), "{} missing", ty);
        }

        let sessions = SessionRegistry::new(Arc::clone(&registry));
        sessions.bootstrap().unwrap();
        let sess = sessions.sess_init(SessionFlags::NONE).unwrap();
        let op = registry.get_plugin_op(OpType::ImageClassify, None);
        let Some(OpFn::ImageClassify(classify)) = op else {
            panic!("image classification not registered");
        };
        assert_eq!(classify(&sess, &b"jpeg"[..]).unwrap(), DUMMY_CLASSIFICATION);
        assert_eq!(backend.calls(), 1);
    }
}
