//! Shared wire contract for the schedlat kernel probe
//!
//! This crate provides the record layout, event type tags and default
//! tuning constants shared between the kernel probe object and the
//! userspace daemon.

#![no_std]

pub mod constants;
pub mod types;

// Re-export commonly used types
pub use constants::*;
pub use types::RawEvent;
