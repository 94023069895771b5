// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Display mode resolution.
//!
//! The resolver reads the monitor's preferred resolution from its EDID
//! descriptor when one exists, walks every mode the graphics output
//! resource reports, keeps the acceptable ones, and picks a single mode to
//! apply: the exact preferred match when a preference exists, otherwise the
//! largest acceptable mode found by linear scan.

use alloc::vec::Vec;
use log::info;

use crate::error::BootError;
use crate::firmware::VideoServices;

/// Pixel memory layouts the graphics resource can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    /// 32-bit blue/green/red with a reserved byte. The only layout the
    /// kernel's frame buffer code understands.
    Bgr,
    Bitmask,
    BltOnly,
}

/// One graphics output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Pixels per scanline. Can exceed `width` when rows carry padding.
    pub stride: u32,
    pub frame_buffer_base: u64,
    pub frame_buffer_size: u64,
}

impl VideoMode {
    /// A mode is acceptable when it is 32-bit BGR and rows carry no
    /// padding pixels, so `offset = y * width + x` addresses the frame
    /// buffer directly.
    pub fn is_acceptable(&self) -> bool {
        self.format == PixelFormat::Bgr && self.stride == self.width
    }
}

/// Monitor-preferred resolution from the EDID detailed timing descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferredResolution {
    pub x: u32,
    pub y: u32,
}

/// Decode the preferred resolution from a raw EDID blob.
///
/// Per VESA E-EDID (tables 3.1 and 3.21), each dimension is 12 bits: the
/// low 8 come from one byte and the upper 4 from the high nibble of a
/// later byte. Returns `None` for a blob too short to hold the first
/// detailed timing descriptor.
pub fn decode_preferred_resolution(edid: &[u8]) -> Option<PreferredResolution> {
    if edid.len() < 62 {
        return None;
    }
    let x = ((u32::from(edid[58]) & 0xF0) << 4) | u32::from(edid[56]);
    let y = ((u32::from(edid[61]) & 0xF0) << 4) | u32::from(edid[59]);
    Some(PreferredResolution { x, y })
}

/// Walk all mode indices in order and keep the acceptable ones.
pub fn enumerate_acceptable_modes<V: VideoServices>(
    video: &mut V,
) -> Result<Vec<VideoMode>, BootError> {
    let count = video.mode_count();
    let mut modes = Vec::new();
    for index in 0..count {
        let mode = video.query_mode(index)?;
        if mode.is_acceptable() {
            modes.push(mode);
        }
    }
    Ok(modes)
}

/// Pick the mode to apply.
///
/// With a preference, only the exact resolution match qualifies. Without
/// one, scan linearly for the largest mode; a later mode replaces the
/// current pick only when strictly larger in both dimensions, so the
/// first-seen mode wins ties.
pub fn select_mode<'a>(
    modes: &'a [VideoMode],
    preferred: Option<PreferredResolution>,
) -> Result<&'a VideoMode, BootError> {
    if let Some(want) = preferred {
        return modes
            .iter()
            .find(|m| m.width == want.x && m.height == want.y)
            .ok_or(BootError::UnsupportedMode);
    }

    let mut best: Option<&VideoMode> = None;
    for mode in modes {
        match best {
            Some(b) if mode.width > b.width && mode.height > b.height => best = Some(mode),
            None => best = Some(mode),
            _ => {}
        }
    }
    best.ok_or(BootError::UnsupportedMode)
}

/// Discover the graphics resource, resolve a mode, and apply it.
///
/// A missing or unreadable EDID is swallowed and treated as "no
/// preference"; a missing graphics resource or a failing mode switch is an
/// error for the caller's policy to judge.
pub fn init_graphics<V: VideoServices>(video: &mut V) -> Result<VideoMode, BootError> {
    video.locate()?;

    let preferred = video.preferred_resolution();
    match preferred {
        Some(p) => info!("display: monitor prefers {}x{}", p.x, p.y),
        None => info!("display: no monitor preference, using largest mode"),
    }

    let modes = enumerate_acceptable_modes(video)?;
    let selected = select_mode(&modes, preferred)?.index;
    let applied = video.set_mode(selected)?;
    info!(
        "display: mode {} set, {}x{} @ {:#x}",
        applied.index, applied.width, applied.height, applied.frame_buffer_base
    );
    Ok(applied)
}

/// The record the kernel reads from its fixed physical address after
/// handoff. Packed little-endian, 14 bytes, no padding.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct VideoSettingsBlock {
    pub bpp: u16,
    pub width: u16,
    pub height: u16,
    pub frame_buffer: u64,
}

impl VideoSettingsBlock {
    pub const SIZE: usize = 14;

    /// Every acceptable mode is 32 bits per pixel.
    pub fn from_mode(mode: &VideoMode) -> Self {
        Self {
            bpp: 32,
            width: mode.width as u16,
            height: mode.height as u16,
            frame_buffer: mode.frame_buffer_base,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.bpp.to_le_bytes());
        out[2..4].copy_from_slice(&self.width.to_le_bytes());
        out[4..6].copy_from_slice(&self.height.to_le_bytes());
        out[6..14].copy_from_slice(&self.frame_buffer.to_le_bytes());
        out
    }
}
