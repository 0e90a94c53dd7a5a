//! Two cores emulated by OS threads.
//!
//! The mailbox is a pair of bounded FIFOs, 8 words deep like the hardware's.
//! Core 1's thread emulates the boot ROM: it echoes every word core 0 sends until it received a full boot
//! sequence, then jumps to the entry point on the stack it was given.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::mem::{self, MaybeUninit};
use std::{io, thread};

use crossbeam_channel::{Receiver, Sender};

use super::Mailbox;
use crate::runtime::context_switch::{self, Continuation};
use crate::runtime::stack::Claim;

const FIFO_DEPTH: usize = 8;

std::thread_local! {
    /// Core 1's end of the mailbox, once it booted.
    static MAILBOX: RefCell<Option<HostMailbox>> = const { RefCell::new(None) };

    /// Where the boot ROM waits for core 1 to halt.
    static BOOT_RETURN: UnsafeCell<MaybeUninit<Continuation>> = const { UnsafeCell::new(MaybeUninit::uninit()) };

    static EXIT: Cell<Option<(&'static Claim, thread::Result<()>)>> = const { Cell::new(None) };
}

/// One core's end of the emulated mailbox.
#[derive(Debug)]
pub struct HostMailbox {
    outbound: Sender<usize>,
    inbound: Receiver<usize>,
    interrupt_enabled: bool,
}

impl HostMailbox {
    fn pair() -> (HostMailbox, HostMailbox) {
        let (to_core1, from_core0) = crossbeam_channel::bounded(FIFO_DEPTH);
        let (to_core0, from_core1) = crossbeam_channel::bounded(FIFO_DEPTH);

        let core0 = HostMailbox {
            outbound: to_core1,
            inbound: from_core1,
            interrupt_enabled: true,
        };
        let core1 = HostMailbox {
            outbound: to_core0,
            inbound: from_core0,
            interrupt_enabled: true,
        };

        (core0, core1)
    }

    /// Pops a word sent by the other core, if there's one.
    pub fn try_read(&mut self) -> Option<usize> {
        self.inbound.try_recv().ok()
    }
}

impl Mailbox for HostMailbox {
    /// # Panics
    /// If the other core is powered off.
    fn write_blocking(&mut self, word: usize) {
        self.outbound.send(word).expect("other core is powered off");
    }

    /// # Panics
    /// If the other core is powered off.
    fn read_blocking(&mut self) -> usize {
        self.inbound.recv().expect("other core is powered off")
    }

    fn drain(&mut self) {
        self.inbound.try_iter().for_each(drop);
    }

    fn interrupt_enabled(&self) -> bool {
        self.interrupt_enabled
    }

    fn set_interrupt_enabled(&mut self, enabled: bool) {
        self.interrupt_enabled = enabled;
    }
}

/// Powers on core 1, which waits in its boot ROM.
///
/// Returns core 0's end of the mailbox.
pub fn power_on() -> io::Result<(HostMailbox, Core1Thread)> {
    power_on_with(None)
}

/// Like [`power_on`], but core 1 answers the first word with [leftover] from a previous run instead of echoing it.
pub fn power_on_with_leftover(leftover: usize) -> io::Result<(HostMailbox, Core1Thread)> {
    power_on_with(Some(leftover))
}

fn power_on_with(leftover: Option<usize>) -> io::Result<(HostMailbox, Core1Thread)> {
    let (core0, core1) = HostMailbox::pair();

    let handle = thread::Builder::new()
        .name("core 1".into())
        .spawn(move || boot_rom(core1, leftover))?;

    Ok((core0, Core1Thread { handle }))
}

/// Core 1, running on its own thread.
#[derive(Debug)]
pub struct Core1Thread {
    handle: thread::JoinHandle<()>,
}

impl Core1Thread {
    /// Waits for core 1's entry to return, resuming its panic.
    ///
    /// Returns right away if core 0 dropped its mailbox without starting core 1.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Gives access to core 1's end of the mailbox.
///
/// # Panics
/// If not called on core 1.
pub fn with_mailbox<T>(f: impl FnOnce(&mut HostMailbox) -> T) -> T {
    MAILBOX.with(|cell| {
        let mut mailbox = cell.borrow_mut();
        f(mailbox.as_mut().expect("only core 1 has this end of the mailbox"))
    })
}

#[derive(Debug, Default)]
struct Vector {
    vector_table: usize,
    stack_pointer: usize,
    entry: usize,
}

fn boot_rom(mut mailbox: HostMailbox, leftover: Option<usize>) {
    let Some(vector) = wait_for_vector(&mut mailbox, leftover) else {
        log::debug!("core 0 hung up before booting core 1");
        return;
    };
    log::debug!("core 1 boot ROM got {vector:x?}");

    MAILBOX.with(|cell| *cell.borrow_mut() = Some(mailbox));

    // safety: core 0 sent the address of the boot shim
    let entry = unsafe { mem::transmute::<usize, unsafe extern "C" fn() -> !>(vector.entry) };
    let continuation = unsafe { context_switch::prepare_stack(vector.stack_pointer as *mut u8, entry) };
    let original = BOOT_RETURN.with(|cell| cell.get());
    unsafe { context_switch::jump(original.cast(), &continuation) };

    // back from power_off, no longer on core 1's stack
    let (claim, result) = EXIT.take().expect("core 1 exits through power_off");
    claim.release();
    MAILBOX.with(|cell| cell.borrow_mut().take());

    if let Err(payload) = result {
        std::panic::resume_unwind(payload);
    }
}

/// Echoes words until it received `0, 0, 1` followed by three more words.
///
/// Any run of zeros counts as the start, anything unexpected starts over.
/// Returns [`None`] once core 0 hung up.
fn wait_for_vector(mailbox: &mut HostMailbox, mut leftover: Option<usize>) -> Option<Vector> {
    let mut vector = Vector::default();
    let mut sequence = 0;

    loop {
        let word = mailbox.inbound.recv().ok()?;

        if let Some(stale) = leftover.take() {
            mailbox.outbound.send(stale).ok()?;
            continue;
        }

        if word == 0 {
            mailbox.drain();
        }
        mailbox.outbound.send(word).ok()?;

        sequence = match (sequence, word) {
            (0 | 1, 0) => sequence + 1,
            (2, 0) => 2,
            (2, 1) => 3,
            (3, address) => {
                vector.vector_table = address;
                4
            }
            (4, address) => {
                vector.stack_pointer = address;
                5
            }
            (5, address) => {
                vector.entry = address;
                return Some(vector);
            }
            _ => 0,
        };
    }
}

/// Returns from core 1's stack to the boot ROM, ending the thread.
pub(super) fn power_off(claim: &'static Claim, result: thread::Result<()>) -> ! {
    EXIT.set(Some((claim, result)));

    let original = BOOT_RETURN.with(|cell| cell.get());
    let mut dummy = MaybeUninit::uninit();
    unsafe { context_switch::jump(dummy.as_mut_ptr(), original.cast()) };
    unreachable!()
}
