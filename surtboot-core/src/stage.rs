// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Image staging: measure a file, allocate its destination, and place its
//! bytes at the final physical address.
//!
//! Sizes come from the file metadata query run through the negotiator; the
//! seek-to-end strategy was retired because the metadata query shares the
//! retry machinery every other buffered firmware query already uses.

use log::info;

use crate::error::BootError;
use crate::firmware::{AllocatePolicy, FileIo, MemoryServices, PAGE_SIZE, PhysAddr};
use crate::negotiate;

/// First attempt at the metadata buffer: the record's fixed header. The
/// negotiator grows it to cover the file name in one retry.
const FILE_INFO_INITIAL: usize = 80;

/// Where a staged image goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Place the image exactly at `base`. The pages are part of a region
    /// the caller already owns; `limit` is the span the image may occupy.
    Fixed { base: PhysAddr, limit: u64 },
    /// Let firmware pick an address, sized to the file.
    AnyPages,
}

/// A file placed in physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedImage {
    pub base: PhysAddr,
    pub size: u64,
    /// Pages spanned by the image.
    pub pages: usize,
}

/// Measure a file through the metadata query.
///
/// The handle is closed on every path; firmware defines close to always
/// succeed, so an earlier error never skips it.
pub fn file_size<F: FileIo>(fw: &mut F, name: &str) -> Result<u64, BootError> {
    let mut file = fw.open(name)?;
    let outcome = negotiate::negotiate(FILE_INFO_INITIAL, |buf| fw.info(&mut file, buf));
    fw.close(file);
    let (_buf, meta) = outcome?;
    Ok(meta.size)
}

/// Stage a file at its destination.
///
/// Reads exactly the measured size into a pool buffer, then bulk-copies
/// into the destination; a short read surfaces as [`BootError::Io`]. Pages
/// allocated here for an any-address destination are released again if a
/// later step fails.
pub fn load_file<F: FileIo + MemoryServices>(
    fw: &mut F,
    name: &str,
    dest: Destination,
) -> Result<StagedImage, BootError> {
    let size = file_size(fw, name)?;
    if size == 0 {
        return Err(BootError::Io);
    }
    let pages = size.div_ceil(PAGE_SIZE) as usize;

    let (base, owns_pages) = match dest {
        Destination::Fixed { base, limit } => {
            if size > limit {
                return Err(BootError::AllocationFailure);
            }
            (base, false)
        }
        Destination::AnyPages => {
            (fw.allocate_pages(AllocatePolicy::AnyPages, pages)?, true)
        }
    };

    match stage_bytes(fw, name, base, size) {
        Ok(()) => {
            info!("staged {name}: {size} bytes at {base:#x}");
            Ok(StagedImage { base, size, pages })
        }
        Err(err) => {
            if owns_pages {
                fw.free_pages(base, pages);
            }
            Err(err)
        }
    }
}

fn stage_bytes<F: FileIo + MemoryServices>(
    fw: &mut F,
    name: &str,
    base: PhysAddr,
    size: u64,
) -> Result<(), BootError> {
    let mut staging = negotiate::alloc_buffer(size as usize)?;
    let mut file = fw.open(name)?;
    let read = fw.read(&mut file, &mut staging);
    fw.close(file);
    if read? as u64 != size {
        return Err(BootError::Io);
    }
    // Destination and staging buffer never overlap: the destination is a
    // fixed region or freshly allocated pages, the staging buffer is pool
    // memory.
    unsafe { fw.copy_bytes(base, &staging) };
    Ok(())
}
