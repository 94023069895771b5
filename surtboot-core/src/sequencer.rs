// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Boot handoff sequencer.
//!
//! Runs the boot stages in fixed order and owns the abort policy. One
//! linear attempt: every stage either completes or the whole boot aborts,
//! releasing the reserved pages and handing an error back to firmware.
//! Success ends in a jump that does not return.

use core::convert::Infallible;
use core::fmt;

use log::{error, info, warn};

use crate::error::BootError;
use crate::firmware::{AllocatePolicy, Firmware, PhysAddr};
use crate::layout::MemoryLayout;
use crate::negotiate;
use crate::stage::{self, Destination};
use crate::video::{self, VideoMode, VideoSettingsBlock};

/// First attempt at the memory map buffer: one descriptor's worth.
const MEMORY_MAP_INITIAL: usize = 48;

/// Attempts at the map-key/exit race before giving up. Each retry fetches
/// a fresh snapshot, so more than a couple only happen on broken firmware.
const EXIT_ATTEMPTS: usize = 8;

/// Whether a display-less boot may proceed. The kernel can run blind, so
/// this is a policy choice rather than a fixed behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsPolicy {
    /// Abort the boot when no acceptable mode can be applied.
    Required,
    /// Log and continue; the settings block is published zeroed.
    Optional,
}

#[derive(Debug, Clone)]
pub struct BootConfig {
    pub layout: MemoryLayout,
    pub graphics: GraphicsPolicy,
    /// Header stub binary, at the volume root.
    pub head_stub_file: &'static str,
    /// Kernel binary, at the volume root.
    pub kernel_file: &'static str,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            layout: MemoryLayout::default(),
            graphics: GraphicsPolicy::Required,
            head_stub_file: "head.bin",
            kernel_file: "kernel.bin",
        }
    }
}

/// The sequencer's stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootStage {
    PrepareFilesystem,
    AllocateKernelMemory,
    InitGraphics,
    LoadKernelImage,
    LoadHeaderStub,
    PublishVideoSettings,
    TerminateFirmwareServices,
    TransferControl,
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PrepareFilesystem => "prepare filesystem",
            Self::AllocateKernelMemory => "allocate kernel memory",
            Self::InitGraphics => "init graphics",
            Self::LoadKernelImage => "load kernel image",
            Self::LoadHeaderStub => "load header stub",
            Self::PublishVideoSettings => "publish video settings",
            Self::TerminateFirmwareServices => "terminate firmware services",
            Self::TransferControl => "transfer control",
        })
    }
}

pub struct Sequencer<'a, F: Firmware> {
    fw: &'a mut F,
    config: BootConfig,
    stage: BootStage,
    reserved: Option<(PhysAddr, usize)>,
}

impl<'a, F: Firmware> Sequencer<'a, F> {
    pub fn new(fw: &'a mut F, config: BootConfig) -> Self {
        Self { fw, config, stage: BootStage::PrepareFilesystem, reserved: None }
    }

    /// Run the boot attempt. Diverges into the kernel on success; returns
    /// the aborting error otherwise, with the reserved pages released.
    pub fn run(mut self) -> BootError {
        let err = match self.try_run() {
            Ok(never) => match never {},
            Err(err) => err,
        };
        error!("boot aborted during {}: {}", self.stage, err);
        if let Some((base, pages)) = self.reserved.take() {
            self.fw.free_pages(base, pages);
        }
        err
    }

    fn enter(&mut self, stage: BootStage) {
        self.stage = stage;
        info!("[{stage}] ...");
    }

    fn done(&self) {
        info!("[{}] ok", self.stage);
    }

    fn try_run(&mut self) -> Result<Infallible, BootError> {
        let layout = self.config.layout;
        layout.validate()?;

        self.enter(BootStage::PrepareFilesystem);
        self.fw.open_volume()?;
        self.done();

        self.enter(BootStage::AllocateKernelMemory);
        let base = self
            .fw
            .allocate_pages(AllocatePolicy::Fixed(layout.reserved_base), layout.reserved_pages)?;
        self.reserved = Some((base, layout.reserved_pages));
        self.done();

        self.enter(BootStage::InitGraphics);
        let mode = self.resolve_graphics()?;
        self.done();

        self.enter(BootStage::LoadKernelImage);
        stage::load_file(
            self.fw,
            self.config.kernel_file,
            Destination::Fixed { base: layout.kernel, limit: layout.kernel_limit() },
        )?;
        self.done();

        self.enter(BootStage::LoadHeaderStub);
        stage::load_file(
            self.fw,
            self.config.head_stub_file,
            Destination::Fixed { base: layout.head_stub, limit: layout.head_stub_limit() },
        )?;
        self.done();

        self.enter(BootStage::PublishVideoSettings);
        // A zeroed block (bpp = 0) tells the kernel no display was set up.
        let block = match &mode {
            Some(mode) => VideoSettingsBlock::from_mode(mode),
            None => VideoSettingsBlock { bpp: 0, width: 0, height: 0, frame_buffer: 0 },
        };
        unsafe {
            self.fw.copy_bytes(layout.video_settings, &block.to_bytes());
        }
        self.done();

        self.enter(BootStage::TerminateFirmwareServices);
        self.terminate()?;

        // Boot services are gone: no logging, no allocation from here on.
        self.stage = BootStage::TransferControl;
        self.fw.transfer_control(layout.head_stub)
    }

    fn resolve_graphics(&mut self) -> Result<Option<VideoMode>, BootError> {
        match video::init_graphics(self.fw) {
            Ok(mode) => Ok(Some(mode)),
            Err(err) => match self.config.graphics {
                GraphicsPolicy::Required => Err(err),
                GraphicsPolicy::Optional => {
                    warn!("display unavailable ({err}); continuing without video");
                    Ok(None)
                }
            },
        }
    }

    /// Fetch the memory map and exit boot services with its key.
    ///
    /// The map buffer stays alive across the exit call and nothing
    /// allocates or frees in between, so the key still names the current
    /// snapshot. A stale-key failure re-fetches and retries; the buffer is
    /// deliberately leaked once the exit succeeds, since the pool it came
    /// from dies with boot services.
    fn terminate(&mut self) -> Result<(), BootError> {
        for attempt in 0..EXIT_ATTEMPTS {
            let (map, key) = negotiate::negotiate(MEMORY_MAP_INITIAL, |buf| {
                self.fw.memory_map(buf)
            })?;
            match self.fw.exit_boot_services(key) {
                Ok(()) => {
                    core::mem::forget(map);
                    return Ok(());
                }
                Err(BootError::ProtocolViolation) if attempt + 1 < EXIT_ATTEMPTS => {
                    drop(map);
                }
                Err(err) => return Err(err),
            }
        }
        Err(BootError::ProtocolViolation)
    }
}
