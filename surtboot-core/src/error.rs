// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Boot failure taxonomy.
//!
//! "Buffer too small" is deliberately absent: it is a retriable condition
//! consumed entirely inside [`crate::negotiate`] and never escapes to a
//! caller.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// A protocol or handle the boot depends on was not found.
    ResourceUnavailable,
    /// Page or pool allocation failed. Always fatal for the current stage.
    AllocationFailure,
    /// No display mode was acceptable, or the preferred one is missing.
    UnsupportedMode,
    /// A file could not be opened or read in full.
    Io,
    /// Firmware rejected an operation that was issued out of protocol,
    /// e.g. exit-boot-services with a stale map key.
    ProtocolViolation,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceUnavailable => f.write_str("firmware resource unavailable"),
            Self::AllocationFailure => f.write_str("memory allocation failed"),
            Self::UnsupportedMode => f.write_str("no usable display mode"),
            Self::Io => f.write_str("file I/O failed"),
            Self::ProtocolViolation => f.write_str("firmware protocol violation"),
        }
    }
}
