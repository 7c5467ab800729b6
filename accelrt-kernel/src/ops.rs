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

//! Operation dispatch
//!
//! One wrapper per operation type. Each wrapper checks the arguments it can
//! check, resolves the implementation with the session's backend-kind hint
//! and calls it on the caller's thread. An operation nothing implements
//! fails with [`AccelError::Unsupported`].

use crate::error::{AccelError, AccelResult};
use crate::op::{OpFn, OpType, SgemmArgs, Tensor};
use crate::resource::{Resource, ResourceType};
use crate::runtime::Runtime;
use crate::session::Session;
use std::path::Path;
use tracing::debug;

fn resolve(runtime: &Runtime, session: &Session, ty: OpType) -> AccelResult<OpFn> {
    let resolved = runtime
        .plugins()
        .resolve_op(ty, session.hint())
        .ok_or_else(|| AccelError::Unsupported(format!("no backend implements {}", ty)))?;
    debug!(op = %ty, session = session.id(), plugin = %resolved.plugin_name, "dispatching");
    Ok(resolved.func)
}

fn same_len(op: OpType, lens: &[usize]) -> AccelResult<()> {
    match lens.split_first() {
        Some((first, rest)) if rest.iter().any(|len| len != first) => Err(
            AccelError::InvalidArgument(format!("{}: operand lengths differ {:?}", op, lens)),
        ),
        _ => Ok(()),
    }
}

fn check_resource(runtime: &Runtime, session: &Session, resource: &Resource) -> AccelResult<()> {
    if !resource.is_live() {
        return Err(AccelError::InvalidArgument(format!(
            "resource {} is not live",
            resource.id()
        )));
    }
    if !runtime.sessions().sess_has_resource(session, resource) {
        return Err(AccelError::InvalidArgument(format!(
            "resource {} is not registered with session {}",
            resource.id(),
            session.id()
        )));
    }
    Ok(())
}

fn mismatch(ty: OpType, func: &OpFn) -> AccelError {
    AccelError::InvalidArgument(format!("{} resolved to {:?}", ty, func))
}

/// Names of the plugins implementing `op`; possibly empty
pub fn get_plugins(runtime: &Runtime, op: OpType) -> AccelResult<Vec<String>> {
    runtime.plugins().get_available_plugins(op)
}

/// Round-trip through a backend without doing any work
pub fn noop(runtime: &Runtime, session: &Session) -> AccelResult<()> {
    let func = resolve(runtime, session, OpType::NoOp)?;
    let OpFn::NoOp(f) = &func else {
        return Err(mismatch(OpType::NoOp, &func));
    };
    f(session)
}

/// Run `symbol` from the shared object at `library`
pub fn exec(
    runtime: &Runtime,
    session: &Session,
    library: &Path,
    symbol: &str,
    read: &[&[u8]],
    write: &mut [&mut [u8]],
) -> AccelResult<()> {
    if symbol.is_empty() {
        return Err(AccelError::InvalidArgument("exec: empty symbol name".into()));
    }
    let func = resolve(runtime, session, OpType::Exec)?;
    let OpFn::Exec(f) = &func else {
        return Err(mismatch(OpType::Exec, &func));
    };
    f(session, library, symbol, read, write)
}

/// Run `symbol` from a shared-object resource registered with the session
pub fn exec_with_resource(
    runtime: &Runtime,
    session: &Session,
    resource: &Resource,
    symbol: &str,
    read: &[&[u8]],
    write: &mut [&mut [u8]],
) -> AccelResult<()> {
    if resource.kind() != ResourceType::SharedObject {
        return Err(AccelError::InvalidArgument(format!(
            "exec: resource {} is a {}, not a shared object",
            resource.id(),
            resource.kind()
        )));
    }
    if symbol.is_empty() {
        return Err(AccelError::InvalidArgument("exec: empty symbol name".into()));
    }
    check_resource(runtime, session, resource)?;

    let func = resolve(runtime, session, OpType::ExecWithResource)?;
    let OpFn::ExecWithResource(f) = &func else {
        return Err(mismatch(OpType::ExecWithResource, &func));
    };
    f(session, resource, symbol, read, write)
}

pub fn array_copy(
    runtime: &Runtime,
    session: &Session,
    src: &[i32],
    dst: &mut [i32],
) -> AccelResult<()> {
    same_len(OpType::ArrayCopy, &[src.len(), dst.len()])?;
    let func = resolve(runtime, session, OpType::ArrayCopy)?;
    let OpFn::ArrayCopy(f) = &func else {
        return Err(mismatch(OpType::ArrayCopy, &func));
    };
    f(session, src, dst)
}

pub fn vector_add(
    runtime: &Runtime,
    session: &Session,
    a: &[f32],
    b: &[f32],
    out: &mut [f32],
) -> AccelResult<()> {
    same_len(OpType::VectorAdd, &[a.len(), b.len(), out.len()])?;
    let func = resolve(runtime, session, OpType::VectorAdd)?;
    let OpFn::VectorAdd(f) = &func else {
        return Err(mismatch(OpType::VectorAdd, &func));
    };
    f(session, a, b, out)
}

/// Square matrix product; all operands hold `n * n` elements
pub fn matmul(
    runtime: &Runtime,
    session: &Session,
    a: &[f32],
    b: &[f32],
    out: &mut [f32],
) -> AccelResult<()> {
    same_len(OpType::MatMul, &[a.len(), b.len(), out.len()])?;
    let side = (a.len() as f64).sqrt() as usize;
    if side * side != a.len() {
        return Err(AccelError::InvalidArgument(format!(
            "matmul: {} elements is not a square matrix",
            a.len()
        )));
    }
    let func = resolve(runtime, session, OpType::MatMul)?;
    let OpFn::MatMul(f) = &func else {
        return Err(mismatch(OpType::MatMul, &func));
    };
    f(session, a, b, out)
}

/// Element-wise sum and product in one call
pub fn parallel(
    runtime: &Runtime,
    session: &Session,
    a: &[f32],
    b: &[f32],
    sum: &mut [f32],
    product: &mut [f32],
) -> AccelResult<()> {
    same_len(OpType::Parallel, &[a.len(), b.len(), sum.len(), product.len()])?;
    let func = resolve(runtime, session, OpType::Parallel)?;
    let OpFn::Parallel(f) = &func else {
        return Err(mismatch(OpType::Parallel, &func));
    };
    f(session, a, b, sum, product)
}

/// Row-major `C = alpha * A * B + beta * C`
pub fn sgemm(
    runtime: &Runtime,
    session: &Session,
    args: &SgemmArgs<'_>,
    c: &mut [f32],
) -> AccelResult<()> {
    let fits = |name: &str, rows: usize, cols: usize, ld: usize, len: usize| {
        if ld < cols || len < rows * ld {
            Err(AccelError::InvalidArgument(format!(
                "sgemm: {} needs {}x{} with leading dimension {}, got {} elements",
                name, rows, cols, ld, len
            )))
        } else {
            Ok(())
        }
    };
    fits("A", args.m, args.k, args.lda, args.a.len())?;
    fits("B", args.k, args.n, args.ldb, args.b.len())?;
    fits("C", args.m, args.n, args.ldc, c.len())?;

    let func = resolve(runtime, session, OpType::BlasSgemm)?;
    let OpFn::BlasSgemm(f) = &func else {
        return Err(mismatch(OpType::BlasSgemm, &func));
    };
    f(session, args, c)
}

/// Classify an encoded image, returning the backend's label
pub fn image_classify(runtime: &Runtime, session: &Session, image: &[u8]) -> AccelResult<String> {
    if image.is_empty() {
        return Err(AccelError::InvalidArgument("image_classify: empty image".into()));
    }
    let func = resolve(runtime, session, OpType::ImageClassify)?;
    let OpFn::ImageClassify(f) = &func else {
        return Err(mismatch(OpType::ImageClassify, &func));
    };
    f(session, image)
}

/// Run a model resource registered with the session
pub fn tensor_inference(
    runtime: &Runtime,
    session: &Session,
    model: &Resource,
    inputs: &[Tensor],
) -> AccelResult<Vec<Tensor>> {
    if !model.kind().is_model() {
        return Err(AccelError::InvalidArgument(format!(
            "inference: resource {} is a {}, not a model",
            model.id(),
            model.kind()
        )));
    }
    check_resource(runtime, session, model)?;

    let func = resolve(runtime, session, OpType::TensorInference)?;
    let OpFn::TensorInference(f) = &func else {
        return Err(mismatch(OpType::TensorInference, &func));
    };
    f(session, model, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::plugin::{BackendKind, PluginInfo};
    use crate::session::SessionFlags;
    use tempfile::TempDir;

    fn runtime() -> (TempDir, Runtime) {
        let root = tempfile::tempdir().unwrap();
        let runtime =
            Runtime::bootstrap(RuntimeConfig::default().with_rundir_root(root.path())).unwrap();
        (root, runtime)
    }

    fn cpu_plugin() -> PluginInfo {
        PluginInfo::new("cpu", BackendKind::Cpu).with_init(|ops| {
            ops.register_all([
                OpFn::vector_add(|_, a, b, out| {
                    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
                        *o = x + y;
                    }
                    Ok(())
                }),
                OpFn::array_copy(|_, src, dst| {
                    dst.copy_from_slice(src);
                    Ok(())
                }),
                OpFn::sgemm(|_, args, c| {
                    for i in 0..args.m {
                        for j in 0..args.n {
                            let dot: f32 = (0..args.k)
                                .map(|p| args.a[i * args.lda + p] * args.b[p * args.ldb + j])
                                .sum();
                            let cell = &mut c[i * args.ldc + j];
                            *cell = args.alpha * dot + args.beta * *cell;
                        }
                    }
                    Ok(())
                }),
            ])
        })
    }

    #[test]
    fn test_unsupported_without_backend() {
        let (_root, runtime) = runtime();
        let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();
        assert!(matches!(noop(&runtime, &sess), Err(AccelError::Unsupported(_))));
        let mut out = [0.0; 2];
        assert!(matches!(
            vector_add(&runtime, &sess, &[1.0, 2.0], &[3.0, 4.0], &mut out),
            Err(AccelError::Unsupported(_))
        ));
        assert!(get_plugins(&runtime, OpType::VectorAdd).unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_to_cpu_backend() {
        let (_root, runtime) = runtime();
        runtime.register_plugin(cpu_plugin()).unwrap();
        let sess = runtime
            .sessions()
            .sess_init(SessionFlags::with_hint(BackendKind::Cpu))
            .unwrap();

        let mut out = [0.0; 3];
        vector_add(&runtime, &sess, &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], &mut out).unwrap();
        assert_eq!(out, [2.0, 3.0, 4.0]);

        let mut dst = [0; 2];
        array_copy(&runtime, &sess, &[7, 9], &mut dst).unwrap();
        assert_eq!(dst, [7, 9]);
        assert_eq!(get_plugins(&runtime, OpType::ArrayCopy).unwrap(), vec!["cpu"]);
    }

    #[test]
    fn test_shape_checks() {
        let (_root, runtime) = runtime();
        runtime.register_plugin(cpu_plugin()).unwrap();
        let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();

        let mut out = [0.0; 2];
        assert!(matches!(
            vector_add(&runtime, &sess, &[1.0], &[1.0, 2.0], &mut out),
            Err(AccelError::InvalidArgument(_))
        ));
        let mut sq = [0.0; 3];
        assert!(matches!(
            matmul(&runtime, &sess, &[0.0; 3], &[0.0; 3], &mut sq),
            Err(AccelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_sgemm() {
        let (_root, runtime) = runtime();
        runtime.register_plugin(cpu_plugin()).unwrap();
        let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();

        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let args = SgemmArgs {
            m: 2,
            n: 2,
            k: 2,
            alpha: 1.0,
            a: &a,
            lda: 2,
            b: &b,
            ldb: 2,
            beta: 0.0,
            ldc: 2,
        };
        let mut c = [0.0; 4];
        sgemm(&runtime, &sess, &args, &mut c).unwrap();
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);

        let mut short = [0.0; 3];
        assert!(sgemm(&runtime, &sess, &args, &mut short).is_err());
    }

    #[test]
    fn test_resource_ops_need_registration() {
        let (_root, runtime) = runtime();
        runtime
            .register_plugin(PluginInfo::new("gpu", BackendKind::Gpu).with_init(|ops| {
                ops.register(OpFn::tensor_inference(|_, _, inputs| Ok(inputs.to_vec())))
            }))
            .unwrap();
        let sess = runtime.sessions().sess_init(SessionFlags::NONE).unwrap();
        let model = runtime
            .resources()
            .resource_new(ResourceType::TfSavedModel, (), |_| Ok(()))
            .unwrap();
        let input = Tensor::new(vec![1, 2], vec![0.5, 1.5]).unwrap();

        assert!(tensor_inference(&runtime, &sess, &model, &[input.clone()]).is_err());

        runtime.sessions().sess_register(&sess, &model).unwrap();
        let out = tensor_inference(&runtime, &sess, &model, &[input.clone()]).unwrap();
        assert_eq!(out, vec![input]);

        let so = runtime
            .resources()
            .resource_new(ResourceType::SharedObject, (), |_| Ok(()))
            .unwrap();
        runtime.sessions().sess_register(&sess, &so).unwrap();
        assert!(matches!(
            tensor_inference(&runtime, &sess, &so, &[]),
            Err(AccelError::InvalidArgument(_))
        ));
    }
}
