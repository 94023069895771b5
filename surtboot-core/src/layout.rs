// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Fixed physical memory layout of the boot handoff.
//!
//! Every absolute address the loader touches lives in one [`MemoryLayout`]
//! value so the whole arrangement can be checked for overlap before any
//! stage runs, instead of scattering literals through the sequence.

use crate::error::BootError;
use crate::firmware::{PAGE_SIZE, PhysAddr};
use crate::video::VideoSettingsBlock;

/// Where the kernel expects to find its video settings record.
pub const VIDEO_SETTINGS_ADDR: PhysAddr = 0x0FF2;
/// Load address and entry point of the header stub.
pub const HEAD_STUB_BASE: PhysAddr = 0x1000;
/// Load address of the kernel image.
pub const KERNEL_BASE: PhysAddr = 0x0020_0000;
/// End of the reserved span. Sized well past what the two images need so
/// the kernel can grow without touching the layout.
pub const RESERVED_END: PhysAddr = 0x0050_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Base of the page range reserved up front for both images.
    pub reserved_base: PhysAddr,
    /// Length of the reserved range, in pages.
    pub reserved_pages: usize,
    /// Header stub load address. Execution begins here after handoff.
    pub head_stub: PhysAddr,
    /// Kernel image load address.
    pub kernel: PhysAddr,
    /// Address of the [`VideoSettingsBlock`] the kernel reads.
    pub video_settings: PhysAddr,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            reserved_base: HEAD_STUB_BASE,
            reserved_pages: ((RESERVED_END - HEAD_STUB_BASE) / PAGE_SIZE) as usize,
            head_stub: HEAD_STUB_BASE,
            kernel: KERNEL_BASE,
            video_settings: VIDEO_SETTINGS_ADDR,
        }
    }
}

impl MemoryLayout {
    /// One past the last reserved byte.
    pub fn reserved_end(&self) -> PhysAddr {
        self.reserved_base + self.reserved_pages as PhysAddr * PAGE_SIZE
    }

    /// Largest header stub the layout can hold: the stub grows toward the
    /// kernel base.
    pub fn head_stub_limit(&self) -> u64 {
        self.kernel - self.head_stub
    }

    /// Largest kernel image the layout can hold.
    pub fn kernel_limit(&self) -> u64 {
        self.reserved_end() - self.kernel
    }

    /// Check the invariants the handoff depends on: page-aligned,
    /// non-empty image regions inside the reserved span, in stub-then-
    /// kernel order, with the settings block outside both.
    pub fn validate(&self) -> Result<(), BootError> {
        let aligned = |a: PhysAddr| a % PAGE_SIZE == 0;
        if !aligned(self.reserved_base) || !aligned(self.head_stub) || !aligned(self.kernel) {
            return Err(BootError::ProtocolViolation);
        }
        if self.reserved_pages == 0
            || self.head_stub < self.reserved_base
            || self.kernel <= self.head_stub
            || self.kernel >= self.reserved_end()
        {
            return Err(BootError::ProtocolViolation);
        }
        // The settings block may not land inside the reserved image span.
        let vs_start = self.video_settings;
        let vs_end = vs_start + VideoSettingsBlock::SIZE as PhysAddr;
        if vs_end > self.reserved_base && vs_start < self.reserved_end() {
            return Err(BootError::ProtocolViolation);
        }
        Ok(())
    }
}
