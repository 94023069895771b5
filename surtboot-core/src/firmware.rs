// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Capability traits over the firmware boot services.
//!
//! The loader consumes a narrow slice of the firmware service tables; each
//! trait below carries exactly the operations one component needs, so the
//! test suite can inject a deterministic double and the UEFI binary can
//! adapt the real tables. All calls are synchronous and single-threaded.

use crate::error::BootError;
use crate::negotiate::QueryStatus;
use crate::video::{PreferredResolution, VideoMode};

/// Physical address. Kept as a plain `u64` like the rest of the loader.
pub type PhysAddr = u64;

/// Architectural page size used for all page math.
pub const PAGE_SIZE: u64 = 4096;

/// How a destination region is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatePolicy {
    /// Pages must be placed exactly at this (page-aligned) address.
    Fixed(PhysAddr),
    /// Firmware picks the address.
    AnyPages,
}

/// Token identifying one memory map snapshot. Any allocation or free made
/// after the snapshot invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapKey(pub usize);

/// The slice of file metadata the loader needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
}

/// Read-only access to the boot volume.
pub trait FileIo {
    type File;

    /// Discover the boot volume through the loaded image's device handle
    /// and open its root directory.
    fn open_volume(&mut self) -> Result<(), BootError>;

    /// Open a file under the volume root, read-only.
    fn open(&mut self, name: &str) -> Result<Self::File, BootError>;

    /// Query file metadata into a caller-supplied buffer. Reports the
    /// required size when the buffer is too small; see [`crate::negotiate`].
    fn info(&mut self, file: &mut Self::File, buf: &mut [u8])
    -> Result<QueryStatus<FileInfo>, BootError>;

    /// Read from the current position. Returns the number of bytes read.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, BootError>;

    /// Close a handle. Defined by firmware to always succeed, so this takes
    /// the handle by value and returns nothing; it must run on every path.
    fn close(&mut self, file: Self::File);
}

/// Page allocation, raw copies into physical memory, and the memory map.
pub trait MemoryServices {
    fn allocate_pages(&mut self, policy: AllocatePolicy, count: usize)
    -> Result<PhysAddr, BootError>;

    fn free_pages(&mut self, base: PhysAddr, count: usize);

    /// Bulk copy into physical memory. The single raw-copy primitive; the
    /// regions must not overlap (guaranteed by the layout invariants).
    ///
    /// # Safety
    /// `dst..dst + src.len()` must be writable memory owned by the loader.
    unsafe fn copy_bytes(&mut self, dst: PhysAddr, src: &[u8]);

    /// Snapshot the memory map into a caller-supplied buffer, yielding the
    /// snapshot's map key. Reports the required size when the buffer is too
    /// small; the required size may keep growing across attempts.
    fn memory_map(&mut self, buf: &mut [u8]) -> Result<QueryStatus<MapKey>, BootError>;
}

/// Graphics output discovery, enumeration, and mode switching.
pub trait VideoServices {
    /// Discover the graphics output resource.
    fn locate(&mut self) -> Result<(), BootError>;

    /// Monitor-reported preferred resolution, if a monitor descriptor is
    /// present. Absence is not an error.
    fn preferred_resolution(&mut self) -> Option<PreferredResolution>;

    /// Number of modes; valid indices are `0..mode_count()`.
    fn mode_count(&mut self) -> u32;

    fn query_mode(&mut self, index: u32) -> Result<VideoMode, BootError>;

    /// Apply a mode and return its descriptor with the post-switch frame
    /// buffer base and size.
    fn set_mode(&mut self, index: u32) -> Result<VideoMode, BootError>;
}

/// The one-way transition out of firmware services.
pub trait Handoff {
    /// Relinquish boot services. `key` must come from the most recent
    /// memory map snapshot; a stale key fails with
    /// [`BootError::ProtocolViolation`] and may be retried with a fresh one.
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), BootError>;

    /// Jump to the header stub. Never returns.
    fn transfer_control(&mut self, entry: PhysAddr) -> !;
}

/// Everything the sequencer drives.
pub trait Firmware: FileIo + MemoryServices + VideoServices + Handoff {}

impl<T: FileIo + MemoryServices + VideoServices + Handoff> Firmware for T {}
