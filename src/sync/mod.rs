//! Synchronization primitives.
//!
//! Fibers of one core never run at the same time, so they share state through plain [`core::cell`] types
//! and hand values off with a [`channel::Channel`].
//! Cores run in parallel, anything they share has to go through a [`spin_lock::SpinLock`].

pub mod channel;
pub mod spin_lock;
