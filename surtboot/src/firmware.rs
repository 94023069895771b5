// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! The capability traits of `surtboot-core`, implemented over UEFI boot
//! services.
//!
//! File access and page allocation go through the `uefi` crate. The memory
//! map and exit-boot-services calls go through the raw service table
//! instead, because the map key negotiation belongs to the core sequencer
//! and the high-level wrappers hide it.

use alloc::vec::Vec;
use core::arch::asm;
use core::ptr::{self, NonNull};

use surtboot_core::error::BootError;
use surtboot_core::firmware::{
    AllocatePolicy, FileIo, FileInfo, Handoff, MapKey, MemoryServices, PhysAddr, VideoServices,
};
use surtboot_core::negotiate::QueryStatus;
use surtboot_core::video::{
    PixelFormat, PreferredResolution, VideoMode, decode_preferred_resolution,
};
use uefi::boot::{
    self, AllocateType, MemoryType, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol,
};
use uefi::proto::console::gop::{GraphicsOutput, Mode, ModeInfo, PixelFormat as GopPixelFormat};
use uefi::proto::media::file::{
    Directory, File, FileAttribute, FileInfo as UefiFileInfo, FileMode, RegularFile,
};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{CStr16, Status, table};
use uefi_raw::table::boot::MemoryDescriptor;

use crate::edid::EdidDiscovered;

pub struct UefiFirmware {
    // Held open so `root` stays usable; dropping the protocol would close
    // the volume underneath it.
    fs: Option<ScopedProtocol<SimpleFileSystem>>,
    root: Option<Directory>,
    gop: Option<ScopedProtocol<GraphicsOutput>>,
    modes: Vec<Mode>,
}

impl UefiFirmware {
    pub fn new() -> Self {
        Self { fs: None, root: None, gop: None, modes: Vec::new() }
    }
}

fn mode_descriptor(index: u32, info: &ModeInfo, frame_buffer: Option<(u64, u64)>) -> VideoMode {
    let (width, height) = info.resolution();
    let format = match info.pixel_format() {
        GopPixelFormat::Rgb => PixelFormat::Rgb,
        GopPixelFormat::Bgr => PixelFormat::Bgr,
        GopPixelFormat::Bitmask => PixelFormat::Bitmask,
        GopPixelFormat::BltOnly => PixelFormat::BltOnly,
    };
    let (fb_base, fb_size) = frame_buffer.unwrap_or((0, 0));
    VideoMode {
        index,
        width: width as u32,
        height: height as u32,
        format,
        stride: info.stride() as u32,
        frame_buffer_base: fb_base,
        frame_buffer_size: fb_size,
    }
}

impl FileIo for UefiFirmware {
    type File = RegularFile;

    fn open_volume(&mut self) -> Result<(), BootError> {
        let mut fs = boot::get_image_file_system(boot::image_handle())
            .map_err(|_| BootError::ResourceUnavailable)?;
        let root = fs.open_volume().map_err(|_| BootError::ResourceUnavailable)?;
        self.fs = Some(fs);
        self.root = Some(root);
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<RegularFile, BootError> {
        let root = self.root.as_mut().ok_or(BootError::ResourceUnavailable)?;
        let mut name_buf = [0u16; 64];
        let name = CStr16::from_str_with_buf(name, &mut name_buf).map_err(|_| BootError::Io)?;
        let handle = root
            .open(name, FileMode::Read, FileAttribute::empty())
            .map_err(|_| BootError::Io)?;
        handle.into_regular_file().ok_or(BootError::Io)
    }

    fn info(
        &mut self,
        file: &mut RegularFile,
        buf: &mut [u8],
    ) -> Result<QueryStatus<FileInfo>, BootError> {
        // The info record wants 8-byte alignment; carve an aligned window
        // out of the negotiated buffer and pad the reported requirement so
        // the retry still fits after the shift.
        let off = buf.as_ptr().align_offset(8).min(buf.len());
        let window = &mut buf[off..];
        match file.get_info::<UefiFileInfo>(window) {
            Ok(info) => Ok(QueryStatus::Done(FileInfo { size: info.file_size() })),
            Err(err) if err.status() == Status::BUFFER_TOO_SMALL => {
                let required = match err.data() {
                    Some(n) => *n,
                    None => window.len() + 64,
                };
                Ok(QueryStatus::TooSmall { required: required + 8 })
            }
            Err(_) => Err(BootError::Io),
        }
    }

    fn read(&mut self, file: &mut RegularFile, buf: &mut [u8]) -> Result<usize, BootError> {
        file.read(buf).map_err(|_| BootError::Io)
    }

    fn close(&mut self, file: RegularFile) {
        file.close();
    }
}

impl MemoryServices for UefiFirmware {
    fn allocate_pages(
        &mut self,
        policy: AllocatePolicy,
        count: usize,
    ) -> Result<PhysAddr, BootError> {
        let ty = match policy {
            AllocatePolicy::Fixed(base) => AllocateType::Address(base),
            AllocatePolicy::AnyPages => AllocateType::AnyPages,
        };
        let ptr = boot::allocate_pages(ty, MemoryType::LOADER_DATA, count)
            .map_err(|_| BootError::AllocationFailure)?;
        Ok(ptr.as_ptr() as PhysAddr)
    }

    fn free_pages(&mut self, base: PhysAddr, count: usize) {
        if let Some(ptr) = NonNull::new(base as *mut u8) {
            // SAFETY: only ranges handed out by `allocate_pages` reach here.
            let _ = unsafe { boot::free_pages(ptr, count) };
        }
    }

    unsafe fn copy_bytes(&mut self, dst: PhysAddr, src: &[u8]) {
        // SAFETY: caller guarantees the destination is loader-owned memory
        // disjoint from `src`.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len()) };
    }

    fn memory_map(&mut self, buf: &mut [u8]) -> Result<QueryStatus<MapKey>, BootError> {
        let st = table::system_table_raw().ok_or(BootError::ResourceUnavailable)?;
        let mut size = buf.len();
        let mut key = 0usize;
        let mut desc_size = 0usize;
        let mut desc_version = 0u32;
        // SAFETY: boot services are still active; the buffer is writable
        // for `size` bytes.
        let status = unsafe {
            let bs = (*st.as_ptr()).boot_services;
            ((*bs).get_memory_map)(
                &mut size,
                buf.as_mut_ptr().cast::<MemoryDescriptor>(),
                &mut key,
                &mut desc_size,
                &mut desc_version,
            )
        };
        match status {
            Status::SUCCESS => Ok(QueryStatus::Done(MapKey(key))),
            Status::BUFFER_TOO_SMALL => Ok(QueryStatus::TooSmall { required: size }),
            _ => Err(BootError::ProtocolViolation),
        }
    }
}

impl VideoServices for UefiFirmware {
    fn locate(&mut self) -> Result<(), BootError> {
        let handle = boot::get_handle_for_protocol::<GraphicsOutput>()
            .map_err(|_| BootError::ResourceUnavailable)?;
        // Non-exclusive: the firmware console keeps drawing through this
        // protocol until boot services end.
        // SAFETY: the protocol is only read and mode-switched through the
        // calls below, never closed behind the firmware's back.
        let gop = unsafe {
            boot::open_protocol::<GraphicsOutput>(
                OpenProtocolParams {
                    handle,
                    agent: boot::image_handle(),
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }
        .map_err(|_| BootError::ResourceUnavailable)?;
        self.modes = gop.modes().collect();
        self.gop = Some(gop);
        Ok(())
    }

    fn preferred_resolution(&mut self) -> Option<PreferredResolution> {
        let handle = boot::get_handle_for_protocol::<EdidDiscovered>().ok()?;
        // SAFETY: read-only data protocol.
        let edid = unsafe {
            boot::open_protocol::<EdidDiscovered>(
                OpenProtocolParams {
                    handle,
                    agent: boot::image_handle(),
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }
        .ok()?;
        decode_preferred_resolution(edid.bytes()?)
    }

    fn mode_count(&mut self) -> u32 {
        self.modes.len() as u32
    }

    fn query_mode(&mut self, index: u32) -> Result<VideoMode, BootError> {
        let mode = self
            .modes
            .get(index as usize)
            .ok_or(BootError::ResourceUnavailable)?;
        Ok(mode_descriptor(index, mode.info(), None))
    }

    fn set_mode(&mut self, index: u32) -> Result<VideoMode, BootError> {
        let gop = self.gop.as_mut().ok_or(BootError::ResourceUnavailable)?;
        let mode = self
            .modes
            .get(index as usize)
            .ok_or(BootError::UnsupportedMode)?;
        gop.set_mode(mode).map_err(|_| BootError::UnsupportedMode)?;
        let info = gop.current_mode_info();
        let mut fb = gop.frame_buffer();
        let frame_buffer = (fb.as_mut_ptr() as u64, fb.size() as u64);
        Ok(mode_descriptor(index, &info, Some(frame_buffer)))
    }
}

impl Handoff for UefiFirmware {
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), BootError> {
        let st = table::system_table_raw().ok_or(BootError::ResourceUnavailable)?;
        let image = boot::image_handle().as_ptr();
        // SAFETY: called exactly once per fresh map key; on success the
        // loader touches no boot service again.
        let status = unsafe {
            let bs = (*st.as_ptr()).boot_services;
            ((*bs).exit_boot_services)(image, key.0)
        };
        match status {
            Status::SUCCESS => Ok(()),
            // ExitBootServices has exactly one failure mode: the map key
            // went stale. The sequencer retries with a fresh snapshot.
            _ => Err(BootError::ProtocolViolation),
        }
    }

    fn transfer_control(&mut self, entry: PhysAddr) -> ! {
        // Mask both PICs and clear IF; the header stub owns interrupts
        // from here. `nop` between the `out`s for machines that dislike
        // back-to-back port writes. Separate from the jump below: this
        // block clobbers `al`, and the jump operand's register must stay
        // out of its way.
        unsafe {
            asm!(
                "mov al, 0xff",
                "out 0x21, al",
                "nop",
                "out 0xa1, al",
                "cli",
                out("al") _,
                options(nostack)
            );
            asm!("jmp {entry}", entry = in(reg) entry, options(noreturn));
        }
    }
}
