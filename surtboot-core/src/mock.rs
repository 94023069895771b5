// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Deterministic firmware double for the test suite.
//!
//! Models the narrow contract the loader consumes: a root volume of named
//! files whose metadata query follows the buffer-too-small convention, a
//! flat physical memory image, a page allocator whose every allocation and
//! free invalidates the current memory map key, a mode table with an
//! optional EDID blob, and a handoff that records the jump and then unwinds
//! (tests catch the unwind; control never "returns" from a transfer).

use std::collections::BTreeMap;

use crate::error::BootError;
use crate::firmware::{
    AllocatePolicy, FileIo, FileInfo, Handoff, MapKey, MemoryServices, PAGE_SIZE, PhysAddr,
    VideoServices,
};
use crate::negotiate::QueryStatus;
use crate::video::{PreferredResolution, VideoMode, decode_preferred_resolution};

/// Metadata buffer bytes the double demands beyond the file name, mirroring
/// the fixed header of the firmware's file info record.
const FILE_INFO_HEADER: usize = 80;

/// Size of the flat physical memory image. Covers the default layout and
/// the any-address arena starting at 16 MiB.
const PHYS_MEMORY_BYTES: usize = 0x0120_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRecord {
    pub base: PhysAddr,
    pub pages: usize,
    pub policy: AllocatePolicy,
    pub freed: bool,
}

pub struct MockFile {
    name: String,
    pos: usize,
}

pub struct MockFirmware {
    // Boot volume.
    pub files: BTreeMap<String, Vec<u8>>,
    pub volume_open: bool,
    pub fail_open_volume: bool,
    pub fail_info: bool,
    /// Truncate every read to this many bytes when set.
    pub short_read: Option<usize>,
    pub opens: usize,
    pub closes: usize,

    // Memory.
    pub memory: Vec<u8>,
    pub allocations: Vec<AllocRecord>,
    pub fail_fixed_alloc: bool,
    next_any_base: PhysAddr,
    /// Bumped by every allocation and free; the current map key.
    alloc_epoch: usize,

    // Graphics.
    pub gop_present: bool,
    pub modes: Vec<VideoMode>,
    pub edid: Option<Vec<u8>>,
    pub fail_set_mode: bool,
    pub current_mode: Option<u32>,

    // Handoff.
    pub map_fetches: usize,
    pub exit_calls: usize,
    pub exited: bool,
    /// Simulate a firmware-internal allocation landing between the caller's
    /// map fetch and this many exit attempts, going stale each time.
    pub hidden_allocs_at_exit: usize,
    /// Fail every exit attempt with this error instead of checking the key.
    pub exit_error: Option<BootError>,
    pub transferred_to: Option<PhysAddr>,
}

impl MockFirmware {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            volume_open: false,
            fail_open_volume: false,
            fail_info: false,
            short_read: None,
            opens: 0,
            closes: 0,
            memory: vec![0; PHYS_MEMORY_BYTES],
            allocations: Vec::new(),
            fail_fixed_alloc: false,
            next_any_base: 0x0100_0000,
            alloc_epoch: 0,
            gop_present: false,
            modes: Vec::new(),
            edid: None,
            fail_set_mode: false,
            current_mode: None,
            map_fetches: 0,
            exit_calls: 0,
            exited: false,
            hidden_allocs_at_exit: 0,
            exit_error: None,
            transferred_to: None,
        }
    }

    pub fn with_file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(name.into(), bytes);
        self
    }

    pub fn with_modes(mut self, modes: Vec<VideoMode>) -> Self {
        self.gop_present = true;
        self.modes = modes;
        self
    }

    /// Install an EDID blob whose detailed timing decodes to `x` by `y`.
    pub fn with_edid_preference(mut self, x: u32, y: u32) -> Self {
        let mut edid = vec![0u8; 128];
        edid[56] = (x & 0xFF) as u8;
        edid[58] = ((x >> 4) & 0xF0) as u8;
        edid[59] = (y & 0xFF) as u8;
        edid[61] = ((y >> 4) & 0xF0) as u8;
        self.edid = Some(edid);
        self
    }

    pub fn phys(&self, addr: PhysAddr, len: usize) -> &[u8] {
        &self.memory[addr as usize..addr as usize + len]
    }
}

impl FileIo for MockFirmware {
    type File = MockFile;

    fn open_volume(&mut self) -> Result<(), BootError> {
        if self.fail_open_volume {
            return Err(BootError::ResourceUnavailable);
        }
        self.volume_open = true;
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<MockFile, BootError> {
        if !self.volume_open {
            return Err(BootError::ResourceUnavailable);
        }
        if !self.files.contains_key(name) {
            return Err(BootError::Io);
        }
        self.opens += 1;
        Ok(MockFile { name: name.into(), pos: 0 })
    }

    fn info(
        &mut self,
        file: &mut MockFile,
        buf: &mut [u8],
    ) -> Result<QueryStatus<FileInfo>, BootError> {
        if self.fail_info {
            return Err(BootError::Io);
        }
        let required = FILE_INFO_HEADER + file.name.len();
        if buf.len() < required {
            return Ok(QueryStatus::TooSmall { required });
        }
        let size = self.files[&file.name].len() as u64;
        Ok(QueryStatus::Done(FileInfo { size }))
    }

    fn read(&mut self, file: &mut MockFile, buf: &mut [u8]) -> Result<usize, BootError> {
        let bytes = &self.files[&file.name];
        let mut n = buf.len().min(bytes.len() - file.pos);
        if let Some(limit) = self.short_read {
            n = n.min(limit);
        }
        buf[..n].copy_from_slice(&bytes[file.pos..file.pos + n]);
        file.pos += n;
        Ok(n)
    }

    fn close(&mut self, _file: MockFile) {
        self.closes += 1;
    }
}

impl MemoryServices for MockFirmware {
    fn allocate_pages(
        &mut self,
        policy: AllocatePolicy,
        count: usize,
    ) -> Result<PhysAddr, BootError> {
        let base = match policy {
            AllocatePolicy::Fixed(base) => {
                if self.fail_fixed_alloc {
                    return Err(BootError::AllocationFailure);
                }
                base
            }
            AllocatePolicy::AnyPages => {
                let base = self.next_any_base;
                self.next_any_base += count as u64 * PAGE_SIZE;
                base
            }
        };
        assert!(
            (base as usize) + count * PAGE_SIZE as usize <= self.memory.len(),
            "allocation outside the modeled memory image"
        );
        self.alloc_epoch += 1;
        self.allocations.push(AllocRecord { base, pages: count, policy, freed: false });
        Ok(base)
    }

    fn free_pages(&mut self, base: PhysAddr, count: usize) {
        self.alloc_epoch += 1;
        let rec = self
            .allocations
            .iter_mut()
            .find(|r| r.base == base && r.pages == count && !r.freed)
            .expect("freeing pages that were never allocated");
        rec.freed = true;
    }

    unsafe fn copy_bytes(&mut self, dst: PhysAddr, src: &[u8]) {
        self.memory[dst as usize..dst as usize + src.len()].copy_from_slice(src);
    }

    fn memory_map(&mut self, buf: &mut [u8]) -> Result<QueryStatus<MapKey>, BootError> {
        self.map_fetches += 1;
        // One 48-byte descriptor per live allocation, plus a baseline.
        let live = self.allocations.iter().filter(|r| !r.freed).count();
        let required = 192 + live * 48;
        if buf.len() < required {
            return Ok(QueryStatus::TooSmall { required });
        }
        buf[..required].fill(0x5A);
        Ok(QueryStatus::Done(MapKey(self.alloc_epoch)))
    }
}

impl VideoServices for MockFirmware {
    fn locate(&mut self) -> Result<(), BootError> {
        if self.gop_present { Ok(()) } else { Err(BootError::ResourceUnavailable) }
    }

    fn preferred_resolution(&mut self) -> Option<PreferredResolution> {
        self.edid.as_deref().and_then(decode_preferred_resolution)
    }

    fn mode_count(&mut self) -> u32 {
        self.modes.len() as u32
    }

    fn query_mode(&mut self, index: u32) -> Result<VideoMode, BootError> {
        self.modes
            .get(index as usize)
            .copied()
            .ok_or(BootError::ResourceUnavailable)
    }

    fn set_mode(&mut self, index: u32) -> Result<VideoMode, BootError> {
        if self.fail_set_mode {
            return Err(BootError::UnsupportedMode);
        }
        self.current_mode = Some(index);
        self.query_mode(index)
    }
}

impl Handoff for MockFirmware {
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), BootError> {
        self.exit_calls += 1;
        if let Some(err) = self.exit_error {
            return Err(err);
        }
        if self.hidden_allocs_at_exit > 0 {
            self.hidden_allocs_at_exit -= 1;
            self.alloc_epoch += 1;
        }
        if key.0 != self.alloc_epoch {
            return Err(BootError::ProtocolViolation);
        }
        self.exited = true;
        Ok(())
    }

    fn transfer_control(&mut self, entry: PhysAddr) -> ! {
        assert!(self.exited, "control transferred while boot services were live");
        self.transferred_to = Some(entry);
        panic!("control transferred");
    }
}
