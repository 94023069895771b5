// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! COM1 serial output (QEMU `-serial stdio`) and the `log` backend.
//!
//! The loader logs through the `log` facade; this module owns the only
//! sink. Serial keeps working after exit-boot-services, unlike the
//! firmware console, though the sequencer stays quiet past that point
//! anyway.

use core::arch::asm;
use core::fmt::{self, Write};

use log::{LevelFilter, Metadata, Record};
use spin::Once;

const COM1: u16 = 0x3F8;

static INIT: Once<()> = Once::new();
static LOGGER: SerialLogger = SerialLogger;

/// Program the UART and install the serial-backed logger. Idempotent.
pub fn init() {
    INIT.call_once(|| {
        unsafe { port_init() };
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Info);
    });
}

/// Emit one raw line, bypassing `log`. For reporting failures before or
/// inside logger setup.
pub fn line(s: &str) {
    unsafe {
        for b in s.bytes() {
            putc(b);
        }
        putc(b'\r');
        putc(b'\n');
    }
}

#[inline(always)]
unsafe fn port_init() {
    asm!("out dx, al", in("dx") COM1 + 1, in("al") 0u8);
    asm!("out dx, al", in("dx") COM1 + 3, in("al") 0x80u8);
    asm!("out dx, al", in("dx") COM1 + 0, in("al") 0x01u8);
    asm!("out dx, al", in("dx") COM1 + 1, in("al") 0x00u8);
    asm!("out dx, al", in("dx") COM1 + 3, in("al") 0x03u8);
    asm!("out dx, al", in("dx") COM1 + 2, in("al") 0xC7u8);
    asm!("out dx, al", in("dx") COM1 + 4, in("al") 0x0Bu8);
}

#[inline(always)]
unsafe fn putc(c: u8) {
    loop {
        let mut lsr: u8;
        asm!("in al, dx", out("al") lsr, in("dx") COM1 + 5);
        if (lsr & 0x20) != 0 {
            break; // THR empty
        }
    }
    asm!("out dx, al", in("dx") COM1, in("al") c);
}

struct SerialWriter;

impl Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        unsafe {
            for b in s.bytes() {
                if b == b'\n' {
                    putc(b'\r');
                }
                putc(b);
            }
        }
        Ok(())
    }
}

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let _ = writeln!(SerialWriter, "[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}
