//! Bounded hand-off between fibers of the same core.
//!
//! A channel holds one value inline plus [N] buffered values, so its capacity is `N + 1`.
//! Blocking operations yield to the other fibers of the core until they can make progress,
//! there's no wait list since round-robin scheduling gives every waiter its turn.
//!
//! # Ordering
//! With the default capacity of one, values are received in the order they were sent.
//! With a larger capacity values are received from the most recently filled slot back to the inline one:
//! a burst of sends is received newest first.
//! ```
//! use cofiber::sync::channel::Channel;
//!
//! let channel: Channel<char, 2> = Channel::new();
//! for value in ['a', 'b', 'c'] {
//!     channel.try_send(value).unwrap();
//! }
//!
//! assert_eq!(channel.try_recv(), Some('c'));
//! assert_eq!(channel.try_recv(), Some('b'));
//! assert_eq!(channel.try_recv(), Some('a'));
//! ```
//!
//! Yielding only hands control to fibers of the calling core, so channels can't be shared across cores.
//! Use [`crate::sync::spin_lock::SpinLock`] for that.

use core::cell::RefCell;

use crate::runtime;

/// Bounded channel with room for `N + 1` values.
pub struct Channel<T, const N: usize = 0> {
    state: RefCell<State<T, N>>,
}

struct State<T, const N: usize> {
    slot: Option<T>,
    buffer: [Option<T>; N],
    count: usize,
}

impl<T, const N: usize> Channel<T, N> {
    /// Creates an empty channel.
    pub const fn new() -> Self {
        Channel {
            state: RefCell::new(State {
                slot: None,
                buffer: [const { None }; N],
                count: 0,
            }),
        }
    }

    /// Sends a value, yielding while the channel is full.
    ///
    /// Never returns if the channel stays full, e.g. when called outside of a fiber.
    pub fn send(&self, value: T) {
        let mut value = value;

        loop {
            match self.try_send(value) {
                Ok(()) => return,
                Err(rejected) => value = rejected,
            }

            runtime::yield_now();
        }
    }

    /// Receives a value, yielding while the channel is empty.
    ///
    /// Never returns if the channel stays empty, e.g. when called outside of a fiber.
    pub fn recv(&self) -> T {
        loop {
            if let Some(value) = self.try_recv() {
                return value;
            }

            runtime::yield_now();
        }
    }

    /// Sends a value if there's room, otherwise hands it back.
    pub fn try_send(&self, value: T) -> Result<(), T> {
        let mut state = self.state.borrow_mut();

        if state.count > N {
            return Err(value);
        }

        let count = state.count;
        let slot = match count {
            0 => &mut state.slot,
            _ => &mut state.buffer[count - 1],
        };
        debug_assert!(slot.is_none());
        *slot = Some(value);
        state.count += 1;

        Ok(())
    }

    /// Receives a value if there's one.
    pub fn try_recv(&self) -> Option<T> {
        let mut state = self.state.borrow_mut();

        if state.count == 0 {
            return None;
        }

        state.count -= 1;
        let count = state.count;
        let slot = match count {
            0 => &mut state.slot,
            _ => &mut state.buffer[count - 1],
        };
        let value = slot.take();
        debug_assert!(value.is_some());
        value
    }

    /// Values waiting to be received.
    pub fn len(&self) -> usize {
        self.state.borrow().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Always `N + 1`.
    pub const fn capacity(&self) -> usize {
        N + 1
    }
}

impl<T, const N: usize> Default for Channel<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> core::fmt::Debug for Channel<T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Channel")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
