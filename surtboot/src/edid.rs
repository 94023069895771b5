// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! EDID Discovered protocol binding.
//!
//! The `uefi` crate does not ship this protocol, so it is declared here:
//! the firmware-read descriptor block of the active display, if any.

use core::slice;

use uefi::proto::unsafe_protocol;

#[repr(C)]
#[unsafe_protocol("1c0c34f6-d380-41fa-a049-8ad06c1a66aa")]
pub struct EdidDiscovered {
    size_of_edid: u32,
    edid: *const u8,
}

impl EdidDiscovered {
    /// The raw EDID bytes. Firmware leaves the pointer null when the
    /// display reported nothing.
    pub fn bytes(&self) -> Option<&[u8]> {
        if self.edid.is_null() || self.size_of_edid == 0 {
            return None;
        }
        // SAFETY: firmware guarantees a non-null pointer references
        // `size_of_edid` readable bytes that stay valid while boot
        // services are active.
        Some(unsafe { slice::from_raw_parts(self.edid, self.size_of_edid as usize) })
    }
}
