// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Buffered query negotiation.
//!
//! Several firmware queries follow a "tell me how big a buffer I need"
//! convention: the call either fills the caller's buffer or fails with the
//! size it actually needs. [`negotiate`] runs that retry loop once, for any
//! such query. The memory map query may keep raising the required size
//! across attempts (the map grows when the retry buffer is allocated), so
//! the loop tolerates repeated too-small answers rather than trusting the
//! first one.

use alloc::vec::Vec;

use crate::error::BootError;

/// Outcome of a single buffered query attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus<T> {
    /// The buffer was large enough; the query filled it and produced `T`.
    Done(T),
    /// The buffer was too small; `required` is the size to retry with.
    TooSmall { required: usize },
}

/// Run a buffered query to completion.
///
/// Starts with a buffer of `initial` bytes and retries on
/// [`QueryStatus::TooSmall`], releasing the undersized buffer before
/// allocating the reported size. Returns the final buffer (still holding the
/// query's output) together with the query's result value. Allocation
/// failure during a retry is fatal; any other query error propagates
/// unchanged.
pub fn negotiate<T>(
    initial: usize,
    mut query: impl FnMut(&mut [u8]) -> Result<QueryStatus<T>, BootError>,
) -> Result<(Vec<u8>, T), BootError> {
    let mut buf = alloc_buffer(initial)?;
    loop {
        match query(&mut buf)? {
            QueryStatus::Done(value) => return Ok((buf, value)),
            QueryStatus::TooSmall { required } => {
                // Free before reallocating so retries never hold two
                // buffers at once.
                drop(core::mem::take(&mut buf));
                buf = alloc_buffer(required)?;
            }
        }
    }
}

/// Allocate a zeroed buffer, surfacing pool exhaustion as a boot error
/// instead of a panic.
pub fn alloc_buffer(len: usize) -> Result<Vec<u8>, BootError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| BootError::AllocationFailure)?;
    buf.resize(len, 0);
    Ok(buf)
}
