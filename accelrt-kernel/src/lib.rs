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

//! # AccelRT Kernel
//!
//! Bookkeeping and dispatch core of a host-side acceleration runtime.
//! Applications open sessions, register resources with them and issue
//! operations; the work itself runs in pluggable backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Backends                             │
//! │  ┌─────────────┐ ┌─────────────┐ ┌────────────────────────┐  │
//! │  │ noop/cpu    │ │ fpga        │ │ remote (session hooks) │  │
//! │  └──────┬──────┘ └──────┬──────┘ └───────────┬────────────┘  │
//! │         └───────────────┼────────────────────┘               │
//! │                         │ PluginInfo + OpFn                  │
//! ├─────────────────────────┼────────────────────────────────────┤
//! │                      Kernel                                  │
//! │  ┌────────────────┐ ┌──────────────────┐ ┌────────────────┐  │
//! │  │ PluginRegistry │ │ SessionRegistry  │ │ResourceRegistry│  │
//! │  └────────────────┘ └──────────────────┘ └────────────────┘  │
//! │           ┌──────────────┐   ┌──────────────┐                │
//! │           │ IdPool       │   │ RunDir       │                │
//! │           └──────────────┘   └──────────────┘                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod global;
pub mod id_pool;
pub mod loader;
pub mod logging;
pub mod op;
pub mod ops;
pub mod plugin;
pub mod resource;
pub mod rundir;
pub mod runtime;
pub mod session;

pub use config::RuntimeConfig;
pub use error::{AccelError, AccelResult, Status};
pub use id_pool::{Id, IdPool, INVALID_ID};
pub use op::{OpFn, OpType, SgemmArgs, Tensor, OP_TYPE_COUNT};
pub use plugin::{
    BackendKind, OpRegistrar, Plugin, PluginId, PluginInfo, PluginOp, PluginRegistry,
    PluginSummary, ResolvedOp, SessionHooks,
};
pub use resource::{Resource, ResourceId, ResourceRegistry, ResourceType, RESOURCE_TYPE_COUNT};
pub use rundir::RunDir;
pub use runtime::Runtime;
pub use session::{Session, SessionFlags, SessionId, SessionMode, SessionRegistry};

/// Kernel version
pub const KERNEL_VERSION: &str = env!("CARGO_PKG_VERSION");

