// SPDX-License-Identifier: MIT
// Copyright (C) 2025 The Surtheim Project

//! Boot-stage logic for the Surtheim loader.
//!
//! Everything with protocol discipline lives here so it can be exercised on
//! the host: the buffered-query negotiator, the display mode resolver, image
//! staging, the memory layout, and the handoff sequencer. The `surtboot`
//! UEFI application implements the [`firmware`] capability traits over real
//! boot services and drives [`sequencer::Sequencer`] from its entry point.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod firmware;
pub mod layout;
pub mod negotiate;
pub mod sequencer;
pub mod stage;
pub mod video;

#[cfg(test)]
pub(crate) mod mock;
#[cfg(test)]
pub(crate) mod test_alloc;

pub use error::BootError;
