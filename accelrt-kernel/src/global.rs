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

//! Process-wide runtime handle

use crate::config::RuntimeConfig;
use crate::error::{AccelError, AccelResult};
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::sync::Arc;

static RUNTIME: Mutex<Option<Arc<Runtime>>> = Mutex::new(None);

/// Bootstrap the process-wide runtime
pub fn init(config: RuntimeConfig) -> AccelResult<Arc<Runtime>> {
    let mut slot = RUNTIME.lock();
    if slot.is_some() {
        return Err(AccelError::AlreadyExists("runtime already initialized".into()));
    }
    let runtime = Arc::new(Runtime::bootstrap(config)?);
    *slot = Some(Arc::clone(&runtime));
    Ok(runtime)
}

/// Bootstrap from the environment
pub fn init_from_env() -> AccelResult<Arc<Runtime>> {
    init(RuntimeConfig::from_env()?)
}

/// The process-wide runtime
pub fn get() -> AccelResult<Arc<Runtime>> {
    RUNTIME
        .lock()
        .as_ref()
        .map(Arc::clone)
        .ok_or(AccelError::BackendNotReady { subsystem: "runtime" })
}

/// Shut down and release the process-wide runtime
///
/// Returns `false` when no runtime was initialized.
pub fn shutdown() -> bool {
    let Some(runtime) = RUNTIME.lock().take() else {
        return false;
    };
    runtime.shutdown();
    true
}
