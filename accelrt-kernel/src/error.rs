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

//! Kernel error types
//!
//! Errors are returned, never thrown across the plugin boundary. Every
//! [`AccelError`] maps onto the integer [`Status`] taxonomy that backends
//! and foreign callers see.

use std::fmt;
use thiserror::Error;

/// Result type for kernel operations
pub type AccelResult<T> = Result<T, AccelError>;

/// Kernel error types
#[derive(Error, Debug)]
pub enum AccelError {
    /// Null, malformed or out-of-range argument supplied by the caller
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing storage could not be obtained
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// An ID pool has no identifiers left to issue
    #[error("{pool} ID pool exhausted")]
    ResourceExhausted { pool: &'static str },

    /// Entry is not (or no longer) registered
    #[error("not found: {0}")]
    NotFound(String),

    /// Entry with the same identity is already registered
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Subsystem used before bootstrap or after cleanup
    #[error("{subsystem} not bootstrapped")]
    BackendNotReady { subsystem: &'static str },

    /// A backend lifecycle or delegation hook failed
    #[error("backend '{plugin}' failed: {message}")]
    Backend { plugin: String, message: String },

    /// Path or name exceeds the supported length
    #[error("name too long: {0}")]
    NameTooLong(String),

    /// No backend implements the requested operation
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Shared object does not export a backend descriptor
    #[error("not an AccelRT backend: {0}")]
    InvalidLibrary(String),

    /// I/O error while managing run directories
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccelError {
    /// Integer status surfaced at the plugin boundary
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidArgument(_) => Status::InvalidArgument,
            Self::OutOfMemory(_) => Status::OutOfMemory,
            Self::ResourceExhausted { .. } => Status::ResourceExhausted,
            Self::NotFound(_) => Status::NotFound,
            Self::AlreadyExists(_) => Status::AlreadyExists,
            Self::BackendNotReady { .. } => Status::BackendNotReady,
            Self::Backend { .. } => Status::BackendError,
            Self::NameTooLong(_) => Status::NameTooLong,
            Self::Unsupported(_) => Status::Unsupported,
            Self::InvalidLibrary(_) => Status::InvalidLibrary,
            Self::Io(err) => match err.kind() {
                std::io::ErrorKind::AlreadyExists => Status::AlreadyExists,
                std::io::ErrorKind::OutOfMemory => Status::OutOfMemory,
                std::io::ErrorKind::InvalidInput => Status::InvalidArgument,
                _ => Status::NotFound,
            },
        }
    }

    /// Wrap a failure reported by a backend hook
    pub(crate) fn backend(plugin: &str, err: AccelError) -> Self {
        match err {
            // already attributed to a backend, keep the innermost name
            err @ AccelError::Backend { .. } => err,
            other => AccelError::Backend {
                plugin: plugin.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Status codes surfaced at the boundary
///
/// Values follow errno numbering where an errno equivalent exists.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    NotFound = 2,
    OutOfMemory = 12,
    AlreadyExists = 17,
    InvalidArgument = 22,
    ResourceExhausted = 28,
    NameTooLong = 36,
    InvalidLibrary = 80,
    Unsupported = 95,
    BackendNotReady = 600,
    BackendError = 601,
}

impl Status {
    /// Raw integer value
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Collapse a result into its status
    pub fn of<T>(result: &AccelResult<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(err) => err.status(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::NotFound => "not found",
            Self::OutOfMemory => "out of memory",
            Self::AlreadyExists => "already exists",
            Self::InvalidArgument => "invalid argument",
            Self::ResourceExhausted => "resource exhausted",
            Self::NameTooLong => "name too long",
            Self::InvalidLibrary => "invalid library",
            Self::Unsupported => "unsupported",
            Self::BackendNotReady => "backend not ready",
            Self::BackendError => "backend error",
        };
        write!(f, "{} ({})", text, self.code())
    }
}
