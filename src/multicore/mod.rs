//! Bringing up the second core.
//!
//! Core 1 waits in its boot ROM for core 0 to send it, through the inter-core mailbox, the sequence
//! `0, 0, 1, vector table, stack pointer, entry`.
//! Every word is echoed back, core 0 starts over whenever the echo doesn't match.
//!
//! Core 1 then runs its entry closure on its own [`Stack`], usually registering fibers and running its own scheduler.
//! Fibers of different cores share state through [`crate::sync::spin_lock::SpinLock`].
//!
//! # Examples
//! ```
//! use cofiber::multicore::{core_id, host, Core1};
//! use cofiber::runtime::{run, spawn, Stack};
//!
//! static CORE1_STACK: Stack<{ 256 * 1024 }> = Stack::new();
//! static BLINKY: Stack<{ 64 * 1024 }> = Stack::new();
//!
//! let (mailbox, core1_thread) = host::power_on().unwrap();
//!
//! Core1::new(mailbox)
//!     .run(&CORE1_STACK, || {
//!         spawn(&BLINKY, || assert_eq!(core_id(), 1)).unwrap();
//!         run().unwrap();
//!     })
//!     .unwrap();
//!
//! core1_thread.join().unwrap();
//! ```

use core::ops::{Deref, DerefMut};
use core::ptr;

use crate::runtime::context_switch;
use crate::runtime::local;
use crate::runtime::stack::Claim;
use crate::runtime::Stack;
use crate::Error;

#[cfg(feature = "std")]
pub mod host;

/// Inter-core FIFO pair, as seen from one core.
pub trait Mailbox {
    /// Pushes a word to the other core, waiting for room.
    fn write_blocking(&mut self, word: usize);

    /// Pops a word sent by the other core, waiting for one.
    fn read_blocking(&mut self) -> usize;

    /// Discards every word sent by the other core.
    fn drain(&mut self);

    fn interrupt_enabled(&self) -> bool;

    fn set_interrupt_enabled(&mut self, enabled: bool);

    /// Wakes the other core if it's waiting for an event.
    fn signal_event(&mut self) {}
}

impl<M: Mailbox + ?Sized> Mailbox for &mut M {
    fn write_blocking(&mut self, word: usize) {
        (**self).write_blocking(word)
    }

    fn read_blocking(&mut self) -> usize {
        (**self).read_blocking()
    }

    fn drain(&mut self) {
        (**self).drain()
    }

    fn interrupt_enabled(&self) -> bool {
        (**self).interrupt_enabled()
    }

    fn set_interrupt_enabled(&mut self, enabled: bool) {
        (**self).set_interrupt_enabled(enabled)
    }

    fn signal_event(&mut self) {
        (**self).signal_event()
    }
}

/// Index of the executing core.
pub fn core_id() -> usize {
    local::core_id()
}

/// Core 0's handle on core 1.
#[derive(Debug)]
pub struct Core1<M: Mailbox> {
    mailbox: M,
    vector_table: usize,
    launched: bool,
}

impl<M: Mailbox> Core1<M> {
    pub fn new(mailbox: M) -> Self {
        Core1 {
            mailbox,
            vector_table: 0,
            launched: false,
        }
    }

    /// Interrupt vector table core 1 starts with, usually the same as core 0's.
    pub fn with_vector_table(mut self, address: usize) -> Self {
        self.vector_table = address;
        self
    }

    /// Starts core 1 running [entry] on [stack].
    ///
    /// Returns once core 1 acknowledged the whole boot sequence.
    /// The stack is released once [entry] returns, core 1 halts afterwards.
    ///
    /// # Errors
    /// [`Error::CoreRunning`] if core 1 was already started, otherwise the errors of claiming [stack].
    pub fn run<F, const N: usize>(&mut self, stack: &'static Stack<N>, entry: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.launched {
            return Err(Error::CoreRunning);
        }

        let stack = stack.claim()?;
        if !stack.fits::<BootFrame<F>>() {
            stack.release();
            return Err(Error::StackTooSmall { size: N });
        }

        let frame = stack.slot::<BootFrame<F>>();
        unsafe {
            frame.write(BootFrame {
                main: core1_main::<F>,
                claim: stack.claim(),
                entry,
            })
        };

        let boot: unsafe extern "C" fn() -> ! = context_switch::boot;
        let sequence = [0, 0, 1, self.vector_table, frame as usize, boot as usize];
        handshake(&mut self.mailbox, &sequence);

        self.launched = true;
        log::info!("launched core 1 with stack at {:#x}", frame as usize);
        Ok(())
    }

    /// Core 0's end of the mailbox, free to use once core 1 runs.
    pub fn mailbox(&mut self) -> &mut M {
        &mut self.mailbox
    }

    pub fn into_mailbox(self) -> M {
        self.mailbox
    }
}

/// Sends [sequence] until core 1 echoed every word of it in a row.
///
/// The mailbox interrupt is masked meanwhile, so no handler steals the echoes.
fn handshake<M: Mailbox + ?Sized>(mailbox: &mut M, sequence: &[usize]) {
    let mut mailbox = InterruptGuard::mask(mailbox);
    let mut index = 0;

    while let Some(&word) = sequence.get(index) {
        if word == 0 {
            mailbox.drain();
            mailbox.signal_event();
        }

        mailbox.write_blocking(word);
        let echo = mailbox.read_blocking();

        if echo == word {
            index += 1;
        } else {
            log::debug!("core 1 echoed {echo:#x} instead of {word:#x}, restarting handshake");
            index = 0;
        }
    }
}

/// Masks the mailbox interrupt, restoring its previous state when dropped.
struct InterruptGuard<'a, M: Mailbox + ?Sized> {
    mailbox: &'a mut M,
    was_enabled: bool,
}

impl<'a, M: Mailbox + ?Sized> InterruptGuard<'a, M> {
    fn mask(mailbox: &'a mut M) -> Self {
        let was_enabled = mailbox.interrupt_enabled();
        mailbox.set_interrupt_enabled(false);
        InterruptGuard { mailbox, was_enabled }
    }
}

impl<M: Mailbox + ?Sized> Deref for InterruptGuard<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.mailbox
    }
}

impl<M: Mailbox + ?Sized> DerefMut for InterruptGuard<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.mailbox
    }
}

impl<M: Mailbox + ?Sized> Drop for InterruptGuard<'_, M> {
    fn drop(&mut self) {
        self.mailbox.set_interrupt_enabled(self.was_enabled);
    }
}

/// Written at the top of core 1's stack, the stack pointer core 1 boots with points at it.
#[repr(C)]
struct BootFrame<F> {
    #[allow(dead_code)] // called by the boot shim
    main: extern "C" fn(*mut BootFrame<F>) -> !,
    claim: &'static Claim,
    entry: F,
}

extern "C" fn core1_main<F: FnOnce()>(frame: *mut BootFrame<F>) -> ! {
    let (claim, entry) = unsafe { ((*frame).claim, ptr::addr_of!((*frame).entry).read()) };

    #[cfg(feature = "std")]
    local::set_core_id(1);
    log::info!("core 1 is up");

    halt(claim, entry)
}

#[cfg(feature = "std")]
fn halt(claim: &'static Claim, entry: impl FnOnce()) -> ! {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry));
    if result.is_err() {
        log::error!("core 1 entry panicked");
    }

    host::power_off(claim, result)
}

#[cfg(not(feature = "std"))]
fn halt(claim: &'static Claim, entry: impl FnOnce()) -> ! {
    entry();

    // spinning touches no stack memory
    claim.release();
    log::debug!("core 1 halted");
    loop {
        core::hint::spin_loop();
    }
}
