// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Test-only global allocator that counts live heap blocks of a few
//! sentinel sizes.
//!
//! Tests that care about buffer lifetime request those exact sizes and ask
//! [`live_tracked`] how many are outstanding. The sizes are deliberately odd
//! so nothing else in the test process (or a sibling test running in
//! parallel) allocates one by accident.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const TRACKED_SIZES: [usize; 4] = [24_001, 48_003, 96_005, 160_007];

static LIVE_TRACKED: AtomicUsize = AtomicUsize::new(0);

pub struct TrackingAllocator;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

/// Number of tracked-size blocks currently allocated and not yet freed.
pub fn live_tracked() -> usize {
    LIVE_TRACKED.load(Ordering::SeqCst)
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() && TRACKED_SIZES.contains(&layout.size()) {
            LIVE_TRACKED.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if TRACKED_SIZES.contains(&layout.size()) {
            LIVE_TRACKED.fetch_sub(1, Ordering::SeqCst);
        }
        unsafe { System.dealloc(ptr, layout) };
    }
}
