// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! UEFI entry point of the Surtheim loader.
//!
//! Everything with protocol discipline lives in `surtboot-core`; this
//! binary wires the capability traits to real boot services, sets up
//! logging, and runs the sequencer. On success the sequencer never
//! returns; the abort path hands an error status back to firmware.

#![no_std]
#![no_main]

extern crate alloc;

mod edid;
mod firmware;
mod serial;

use core::arch::asm;
use log::{error, info};
use surtboot_core::BootError;
use surtboot_core::sequencer::{BootConfig, Sequencer};
use uefi::prelude::*;

#[global_allocator]
static ALLOCATOR: uefi::allocator::Allocator = uefi::allocator::Allocator;

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    halt();
}

fn halt() -> ! {
    unsafe {
        loop {
            asm!("hlt");
        }
    }
}

/// Map a boot failure onto the status returned to firmware.
fn abort_status(err: BootError) -> Status {
    match err {
        BootError::ResourceUnavailable => Status::NOT_FOUND,
        BootError::AllocationFailure => Status::OUT_OF_RESOURCES,
        BootError::UnsupportedMode => Status::UNSUPPORTED,
        BootError::Io => Status::LOAD_ERROR,
        BootError::ProtocolViolation => Status::ABORTED,
    }
}

#[entry]
fn main() -> Status {
    serial::init();
    if uefi::helpers::init().is_err() {
        serial::line("[fatal] uefi::helpers::init failed");
        halt();
    }
    info!("surtboot: loader start");

    let mut fw = firmware::UefiFirmware::new();
    let err = Sequencer::new(&mut fw, BootConfig::default()).run();

    // Only the abort path reaches this point.
    error!("surtboot: giving control back to firmware");
    abort_status(err)
}
