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

//! Operation types and typed backend callables
//!
//! Every operation a backend can implement is one variant of the closed
//! [`OpType`] enumeration. The callable for each type is carried by the
//! matching [`OpFn`] variant, so a registered function can never disagree
//! with the signature its type implies.

use crate::error::{AccelError, AccelResult};
use crate::resource::Resource;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Number of operation types
pub const OP_TYPE_COUNT: usize = 10;

/// Kind of acceleration request, independent of the backend executing it
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpType {
    #[serde(rename = "noop")]
    NoOp = 0,
    Exec = 1,
    ExecWithResource = 2,
    ArrayCopy = 3,
    VectorAdd = 4,
    #[serde(rename = "matmul")]
    MatMul = 5,
    Parallel = 6,
    BlasSgemm = 7,
    ImageClassify = 8,
    TensorInference = 9,
}

impl OpType {
    /// All operation types in numeric order
    pub const ALL: [OpType; OP_TYPE_COUNT] = [
        OpType::NoOp,
        OpType::Exec,
        OpType::ExecWithResource,
        OpType::ArrayCopy,
        OpType::VectorAdd,
        OpType::MatMul,
        OpType::Parallel,
        OpType::BlasSgemm,
        OpType::ImageClassify,
        OpType::TensorInference,
    ];

    /// Position in per-type tables
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable kebab-case name
    pub fn name(self) -> &'static str {
        match self {
            OpType::NoOp => "noop",
            OpType::Exec => "exec",
            OpType::ExecWithResource => "exec-with-resource",
            OpType::ArrayCopy => "array-copy",
            OpType::VectorAdd => "vector-add",
            OpType::MatMul => "matmul",
            OpType::Parallel => "parallel",
            OpType::BlasSgemm => "blas-sgemm",
            OpType::ImageClassify => "image-classify",
            OpType::TensorInference => "tensor-inference",
        }
    }
}

impl TryFrom<u32> for OpType {
    type Error = AccelError;

    fn try_from(raw: u32) -> AccelResult<Self> {
        OpType::ALL.get(raw as usize).copied().ok_or_else(|| {
            AccelError::InvalidArgument(format!(
                "operation type {} out of range (max {})",
                raw,
                OP_TYPE_COUNT - 1
            ))
        })
    }
}

impl FromStr for OpType {
    type Err = AccelError;

    fn from_str(s: &str) -> AccelResult<Self> {
        OpType::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AccelError::InvalidArgument(format!("unknown operation '{}'", s)))
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Operation Arguments
// ============================================================================

/// Single-precision GEMM arguments: `C = alpha * A * B + beta * C`
#[derive(Debug, Clone, Copy)]
pub struct SgemmArgs<'a> {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: f32,
    pub a: &'a [f32],
    pub lda: usize,
    pub b: &'a [f32],
    pub ldb: usize,
    pub beta: f32,
    pub ldc: usize,
}

/// Dense f32 tensor exchanged with inference backends
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `dims` exactly
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> AccelResult<Self> {
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(AccelError::InvalidArgument(format!(
                "tensor dims {:?} need {} elements, got {}",
                dims,
                expected,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

// ============================================================================
// Typed Callables
// ============================================================================

pub type NoOpFn = dyn Fn(&Session) -> AccelResult<()> + Send + Sync;
pub type ExecFn =
    dyn Fn(&Session, &Path, &str, &[&[u8]], &mut [&mut [u8]]) -> AccelResult<()> + Send + Sync;
pub type ExecWithResourceFn =
    dyn Fn(&Session, &Resource, &str, &[&[u8]], &mut [&mut [u8]]) -> AccelResult<()> + Send + Sync;
pub type ArrayCopyFn = dyn Fn(&Session, &[i32], &mut [i32]) -> AccelResult<()> + Send + Sync;
pub type BinaryF32Fn =
    dyn Fn(&Session, &[f32], &[f32], &mut [f32]) -> AccelResult<()> + Send + Sync;
pub type ParallelFn =
    dyn Fn(&Session, &[f32], &[f32], &mut [f32], &mut [f32]) -> AccelResult<()> + Send + Sync;
pub type SgemmFn = dyn Fn(&Session, &SgemmArgs<'_>, &mut [f32]) -> AccelResult<()> + Send + Sync;
pub type ImageClassifyFn = dyn Fn(&Session, &[u8]) -> AccelResult<String> + Send + Sync;
pub type TensorInferenceFn =
    dyn Fn(&Session, &Resource, &[Tensor]) -> AccelResult<Vec<Tensor>> + Send + Sync;

/// Backend implementation of one operation type
#[derive(Clone)]
pub enum OpFn {
    NoOp(Arc<NoOpFn>),
    Exec(Arc<ExecFn>),
    ExecWithResource(Arc<ExecWithResourceFn>),
    ArrayCopy(Arc<ArrayCopyFn>),
    VectorAdd(Arc<BinaryF32Fn>),
    MatMul(Arc<BinaryF32Fn>),
    Parallel(Arc<ParallelFn>),
    BlasSgemm(Arc<SgemmFn>),
    ImageClassify(Arc<ImageClassifyFn>),
    TensorInference(Arc<TensorInferenceFn>),
}

impl OpFn {
    /// Operation type implemented by this callable
    pub fn op_type(&self) -> OpType {
        match self {
            OpFn::NoOp(_) => OpType::NoOp,
            OpFn::Exec(_) => OpType::Exec,
            OpFn::ExecWithResource(_) => OpType::ExecWithResource,
            OpFn::ArrayCopy(_) => OpType::ArrayCopy,
            OpFn::VectorAdd(_) => OpType::VectorAdd,
            OpFn::MatMul(_) => OpType::MatMul,
            OpFn::Parallel(_) => OpType::Parallel,
            OpFn::BlasSgemm(_) => OpType::BlasSgemm,
            OpFn::ImageClassify(_) => OpType::ImageClassify,
            OpFn::TensorInference(_) => OpType::TensorInference,
        }
    }

    pub fn noop(f: impl Fn(&Session) -> AccelResult<()> + Send + Sync + 'static) -> Self {
        OpFn::NoOp(Arc::new(f))
    }

    pub fn exec(
        f: impl Fn(&Session, &Path, &str, &[&[u8]], &mut [&mut [u8]]) -> AccelResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        OpFn::Exec(Arc::new(f))
    }

    pub fn exec_with_resource(
        f: impl Fn(&Session, &Resource, &str, &[&[u8]], &mut [&mut [u8]]) -> AccelResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        OpFn::ExecWithResource(Arc::new(f))
    }

    pub fn array_copy(
        f: impl Fn(&Session, &[i32], &mut [i32]) -> AccelResult<()> + Send + Sync + 'static,
    ) -> Self {
        OpFn::ArrayCopy(Arc::new(f))
    }

    pub fn vector_add(
        f: impl Fn(&Session, &[f32], &[f32], &mut [f32]) -> AccelResult<()> + Send + Sync + 'static,
    ) -> Self {
        OpFn::VectorAdd(Arc::new(f))
    }

    pub fn matmul(
        f: impl Fn(&Session, &[f32], &[f32], &mut [f32]) -> AccelResult<()> + Send + Sync + 'static,
    ) -> Self {
        OpFn::MatMul(Arc::new(f))
    }

    pub fn parallel(
        f: impl Fn(&Session, &[f32], &[f32], &mut [f32], &mut [f32]) -> AccelResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        OpFn::Parallel(Arc::new(f))
    }

    pub fn sgemm(
        f: impl Fn(&Session, &SgemmArgs<'_>, &mut [f32]) -> AccelResult<()> + Send + Sync + 'static,
    ) -> Self {
        OpFn::BlasSgemm(Arc::new(f))
    }

    pub fn image_classify(
        f: impl Fn(&Session, &[u8]) -> AccelResult<String> + Send + Sync + 'static,
    ) -> Self {
        OpFn::ImageClassify(Arc::new(f))
    }

    pub fn tensor_inference(
        f: impl Fn(&Session, &Resource, &[Tensor]) -> AccelResult<Vec<Tensor>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        OpFn::TensorInference(Arc::new(f))
    }
}

impl fmt::Debug for OpFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpFn({})", self.op_type())
    }
}
