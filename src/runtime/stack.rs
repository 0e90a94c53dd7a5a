//! Statically allocated fiber stacks.

use core::cell::UnsafeCell;
use core::mem::{self, MaybeUninit};
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::sync::spin_lock::test_and_set;
use crate::Error;

/// Bytes left below the entry closure for the trampoline and the saved context.
pub const MIN_FREE: usize = 256;

/// Written over the whole stack before a fiber first runs, see [`Stack::usage`].
const PAINT: u8 = 0xA5;

/// Call stack memory for a single fiber.
///
/// Declared as a `static` so it lives for the whole program:
/// ```
/// use cofiber::Stack;
///
/// static BLINKY_STACK: Stack<2048> = Stack::new();
/// ```
/// A stack is owned by at most one fiber at a time.
/// Ownership is given back once that fiber's entry point returns.
#[repr(C, align(16))]
pub struct Stack<const N: usize> {
    memory: UnsafeCell<[MaybeUninit<u8>; N]>,
    claim: Claim,
}

// safety: the memory is only touched by the fiber holding the claim
unsafe impl<const N: usize> Sync for Stack<N> {}

impl<const N: usize> Stack<N> {
    /// Creates an unclaimed stack, usable in a `static` initializer.
    pub const fn new() -> Self {
        Stack {
            memory: UnsafeCell::new([MaybeUninit::uninit(); N]),
            claim: Claim::new(),
        }
    }

    /// Size in bytes.
    pub const fn size(&self) -> usize {
        N
    }

    /// Whether a fiber currently owns this stack.
    pub fn is_claimed(&self) -> bool {
        self.claim.claimed.load(Ordering::Acquire)
    }

    /// High watermark: bytes written since the stack was last handed to a fiber.
    ///
    /// Zero if the stack was never used.
    pub fn usage(&self) -> usize {
        if !self.claim.painted.load(Ordering::Acquire) {
            return 0;
        }

        // stacks grow downwards, untouched paint remains at the lowest addresses
        let bottom = self.memory.get() as *const u8;
        let untouched = (0..N)
            .take_while(|&offset| unsafe { ptr::read_volatile(bottom.add(offset)) } == PAINT)
            .count();

        N - untouched
    }

    /// Takes exclusive ownership of the memory.
    pub(crate) fn claim(&'static self) -> Result<RawStack, Error> {
        if test_and_set(&self.claim.claimed) {
            return Err(Error::StackInUse);
        }

        let stack = RawStack {
            bottom: self.memory.get() as *mut u8,
            length: N,
            claim: &self.claim,
        };
        stack.paint();

        Ok(stack)
    }
}

impl<const N: usize> Default for Stack<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for Stack<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("size", &N)
            .field("claimed", &self.is_claimed())
            .finish()
    }
}

/// Ownership state shared between a [`Stack`] and the fiber running on it.
#[derive(Debug)]
pub(crate) struct Claim {
    claimed: AtomicBool,
    painted: AtomicBool,
}

impl Claim {
    const fn new() -> Self {
        Claim {
            claimed: AtomicBool::new(false),
            painted: AtomicBool::new(false),
        }
    }

    pub(crate) fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

/// Type erased view of a claimed [`Stack`].
///
/// Upper addresses hold the fiber's entry closure, the context is prepared right below it.
#[derive(Debug, Copy, Clone)]
pub(crate) struct RawStack {
    bottom: *mut u8,
    length: usize,
    claim: &'static Claim,
}

impl RawStack {
    fn paint(&self) {
        unsafe { ptr::write_bytes(self.bottom, PAINT, self.length) };
        self.claim.painted.store(true, Ordering::Release);
    }

    /// Upper address of the memory, stack addresses grow downwards.
    pub(crate) fn base(&self) -> *mut u8 {
        // safety: part of same allocation, can't overflow
        unsafe { self.bottom.add(self.length) }
    }

    /// Location of a value of type [U] stored at the top of the stack.
    ///
    /// Aligned to at least 16 bytes, so it doubles as a stack pointer.
    pub(crate) fn slot<U>(&self) -> *mut U {
        let align = mem::align_of::<U>().max(16);
        let address = (self.base() as usize - mem::size_of::<U>()) & !(align - 1);
        address as *mut U
    }

    /// Whether a value of type [U] fits at the top with [`MIN_FREE`] bytes to spare.
    pub(crate) fn fits<U>(&self) -> bool {
        let align = mem::align_of::<U>().max(16);
        let needed = mem::size_of::<U>() + align + MIN_FREE;
        needed <= self.length
    }

    pub(crate) fn claim(&self) -> &'static Claim {
        self.claim
    }

    pub(crate) fn release(self) {
        self.claim.release();
    }
}
