//! Cooperative fibers for microcontrollers.
//!
//! Fibers are threads of execution with their own statically allocated stack.
//! Each core schedules its fibers round-robin, switching only when the running fiber yields.
//! A second core is brought up with [`multicore::Core1`] and runs a scheduler of its own.
//!
//! # Examples
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! static PRODUCER: cofiber::Stack<{ 64 * 1024 }> = cofiber::Stack::new();
//! static CONSUMER: cofiber::Stack<{ 64 * 1024 }> = cofiber::Stack::new();
//!
//! let channel = Rc::new(cofiber::sync::channel::Channel::<u32>::new());
//! let total = Rc::new(Cell::new(0));
//!
//! cofiber::spawn(&PRODUCER, {
//!     let channel = channel.clone();
//!     move || (1..=10).for_each(|n| channel.send(n))
//! })
//! .unwrap();
//!
//! cofiber::spawn(&CONSUMER, {
//!     let (channel, total) = (channel.clone(), total.clone());
//!     move || (1..=10).for_each(|_| total.set(total.get() + channel.recv()))
//! })
//! .unwrap();
//!
//! cofiber::run().unwrap();
//! assert_eq!(total.get(), 55);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate self as cofiber;

#[cfg(feature = "macros")]
pub use cofiber_macros::{fiber, main};

pub use runtime::{run, spawn, yield_now, Fiber, FiberId, Stack};

pub mod multicore;
pub mod runtime;
pub mod sync;
pub mod time;

/// Everything that can go wrong declaring and running fibers.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The stack already belongs to a fiber.
    #[error("stack is already claimed by another fiber")]
    StackInUse,

    /// The stack can't hold the entry closure and leave [`runtime::MIN_FREE`] bytes to run on.
    #[error("stack of {size} bytes is too small for the entry closure")]
    StackTooSmall { size: usize },

    #[error("scheduler can't register more than {capacity} fibers")]
    ArenaFull { capacity: usize },

    /// The scheduler of this core is running, e.g. calling [`run`] from a fiber.
    #[error("scheduler is already running")]
    SchedulerRunning,

    #[error("scheduler still has fibers registered")]
    SchedulerBusy,

    #[error("core was already started")]
    CoreRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::StackTooSmall { size: 256 }.to_string(),
            "stack of 256 bytes is too small for the entry closure"
        );
        assert_eq!(
            Error::ArenaFull { capacity: 32 }.to_string(),
            "scheduler can't register more than 32 fibers"
        );
    }

    #[test]
    fn trait_implementations() {
        use impls::impls;

        assert!(impls!(Error: (std::error::Error) & Send & Sync & Copy & (core::fmt::Debug)));
    }
}
