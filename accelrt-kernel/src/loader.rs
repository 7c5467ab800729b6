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

//! Backend loader
//!
//! Opens backend shared objects, pulls the plugin descriptor out of the
//! well-known entry symbol and installs the plugin: register, then `init`.
//! A plugin whose `init` fails is unregistered and its library released.
//!
//! Backends are Rust `cdylib`s built against this crate; the entry symbol
//! uses the Rust ABI and must be built with the same toolchain.

use crate::error::{AccelError, AccelResult};
use crate::plugin::{Plugin, PluginId, PluginInfo, PluginRegistry};
use libloading::{Library, Symbol};
use std::path::Path;
use tracing::{error, info};

/// Symbol every backend exports
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"accelrt_plugin_descriptor\0";

/// Signature of the entry symbol
pub type PluginEntryFn = fn() -> PluginInfo;

/// Load one backend library and install its plugin
pub fn load_backend(registry: &PluginRegistry, path: &Path) -> AccelResult<PluginId> {
    // SAFETY: loading runs the library's initializers; backends are trusted
    // code named explicitly by configuration
    let library = unsafe { Library::new(path) }
        .map_err(|e| AccelError::NotFound(format!("{}: {}", path.display(), e)))?;

    // SAFETY: the entry symbol is declared with `PluginEntryFn`'s signature
    // by every backend
    let info = unsafe {
        let entry: Symbol<PluginEntryFn> = library.get(PLUGIN_ENTRY_SYMBOL).map_err(|e| {
            AccelError::InvalidLibrary(format!("{}: {}", path.display(), e))
        })?;
        entry()
    };

    let id = install(registry, Plugin::new(info).with_library(library))?;
    info!(path = %path.display(), plugin = id, "loaded backend");
    Ok(id)
}

/// Load backends in order, stopping at the first failure
pub fn load_backends<P: AsRef<Path>>(
    registry: &PluginRegistry,
    paths: impl IntoIterator<Item = P>,
) -> AccelResult<Vec<PluginId>> {
    let mut loaded = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match load_backend(registry, path) {
            Ok(id) => loaded.push(id),
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not load backend");
                return Err(e);
            }
        }
    }
    Ok(loaded)
}

/// Install a plugin linked into the process
pub fn register_builtin(registry: &PluginRegistry, info: PluginInfo) -> AccelResult<PluginId> {
    install(registry, Plugin::new(info))
}

fn install(registry: &PluginRegistry, plugin: Plugin) -> AccelResult<PluginId> {
    let id = registry.register_plugin(plugin)?;

    if let Err(e) = registry.init_plugin(id) {
        error!(plugin = id, error = %e, "plugin init failed");
        // init failed, so fini is not owed; dropping releases the library
        drop(registry.unregister_plugin(id));
        return Err(e);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{OpFn, OpType};
    use crate::plugin::BackendKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.bootstrap();
        registry
    }

    #[test]
    fn test_missing_library() {
        let registry = registry();
        let err = load_backend(&registry, Path::new("/nonexistent/libaccel-none.so")).unwrap_err();
        assert!(matches!(err, AccelError::NotFound(_)));
    }

    #[test]
    fn test_not_a_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfake.so");
        std::fs::write(&path, b"not an elf").unwrap();

        let registry = registry();
        assert!(load_backend(&registry, &path).is_err());
        assert!(registry.list_plugins().is_empty());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_library_without_entry_symbol() {
        let registry = registry();
        let err = load_backend(&registry, Path::new("libc.so.6")).unwrap_err();
        assert!(matches!(err, AccelError::InvalidLibrary(_)));
    }

    #[test]
    fn test_stops_at_first_failure() {
        let registry = registry();
        let err = load_backends(
            &registry,
            ["/nonexistent/a.so", "/nonexistent/b.so"],
        )
        .unwrap_err();
        assert!(err.to_string().contains("a.so"));
    }

    #[test]
    fn test_builtin_init_registers_ops() {
        let registry = registry();
        let info = PluginInfo::new("builtin", BackendKind::Cpu)
            .with_init(|ops| ops.register(OpFn::noop(|_| Ok(()))));
        register_builtin(&registry, info).unwrap();
        assert!(registry.get_plugin_op(OpType::NoOp, None).is_some());
    }

    #[test]
    fn test_failed_init_is_rolled_back() {
        let finis = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finis);

        let registry = registry();
        let info = PluginInfo::new("broken", BackendKind::Fpga)
            .with_init(|ops| {
                ops.register(OpFn::noop(|_| Ok(())))?;
                Err(AccelError::Unsupported("no device".into()))
            })
            .with_fini(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let err = register_builtin(&registry, info).unwrap_err();
        assert!(matches!(err, AccelError::Backend { .. }));
        assert!(registry.list_plugins().is_empty());
        assert!(registry.get_plugin_op(OpType::NoOp, None).is_none());
        assert_eq!(finis.load(Ordering::SeqCst), 0);
    }
}
