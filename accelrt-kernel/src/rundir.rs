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

//! Per-process run directory
//!
//! Each runtime owns a private `accelrt.XXXXXX` directory under the
//! configured root. Resources create their scratch directories inside it.
//! The tree is removed at shutdown.

use crate::error::{AccelError, AccelResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Longest run-directory path accepted, in bytes
pub const MAX_RUNDIR_PATH: usize = 1024;

const RUNDIR_PREFIX: &str = "accelrt.";
const RUNDIR_RAND_LEN: usize = 6;

/// The run directory of one runtime
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl RunDir {
    /// Create a fresh run directory inside `root`
    ///
    /// `root` is created (mode 0700) if it does not exist yet.
    pub fn create(root: &Path) -> AccelResult<Self> {
        let expected = root.as_os_str().len() + 1 + RUNDIR_PREFIX.len() + RUNDIR_RAND_LEN;
        if expected > MAX_RUNDIR_PATH {
            return Err(AccelError::NameTooLong(root.display().to_string()));
        }

        ensure_root(root)?;

        let dir = tempfile::Builder::new()
            .prefix(RUNDIR_PREFIX)
            .rand_bytes(RUNDIR_RAND_LEN)
            .tempdir_in(root)?;
        restrict(dir.path())?;

        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "created run directory");
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is still present
    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Remove the directory tree; failures are logged only
    pub fn remove(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => debug!(path = %self.path.display(), "removed run directory"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "could not remove run directory"
            ),
        }
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(unix)]
fn ensure_root(root: &Path) -> AccelResult<()> {
    use std::os::unix::fs::DirBuilderExt;

    if root.is_dir() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(root)?;
    Ok(())
}

#[cfg(not(unix))]
fn ensure_root(root: &Path) -> AccelResult<()> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

#[cfg(unix)]
fn restrict(path: &Path) -> AccelResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict(_path: &Path) -> AccelResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_remove() {
        let root = tempfile::tempdir().unwrap();
        let mut rundir = RunDir::create(root.path()).unwrap();

        let path = rundir.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("accelrt.") && n.len() == 14));

        std::fs::write(path.join("scratch"), b"x").unwrap();
        rundir.remove();
        assert!(!path.exists());
        assert!(!rundir.is_active());
        rundir.remove();
    }

    #[test]
    fn test_missing_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("user").join("1000");
        let rundir = RunDir::create(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(rundir.path().starts_with(&nested));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_mode() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let rundir = RunDir::create(root.path()).unwrap();
        let mode = std::fs::metadata(rundir.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_name_too_long() {
        let root = PathBuf::from(format!("/tmp/{}", "a".repeat(MAX_RUNDIR_PATH)));
        assert!(matches!(
            RunDir::create(&root),
            Err(AccelError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_drop_removes() {
        let root = tempfile::tempdir().unwrap();
        let path = RunDir::create(root.path()).unwrap().path().to_path_buf();
        assert!(!path.exists());
    }
}
