//! Per-core storage.
//!
//! Every core owns exactly one scheduler, built at compile time and kept for the core's lifetime.
//! With the `std` feature each OS thread stands in for a core, so thread local storage is a perfect fit.
//! On bare metal the board reports which core is executing and each core gets a slot of a static array.

use core::cell::RefCell;

use super::Scheduler;

/// Cache padded to avoid false sharing between cores.
#[repr(align(128))]
struct Local(RefCell<Scheduler>);

#[cfg(feature = "std")]
std::thread_local! {
    /// Each thread gets its own independent scheduler.
    static SCHEDULER: Local = const { Local(RefCell::new(Scheduler::new())) };

    /// Set once by the emulated boot ROM of a secondary core.
    static CORE_ID: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
}

/// Borrow the scheduler of the executing core.
///
/// # Panics
/// If called again from within [f].
#[cfg(feature = "std")]
pub(crate) fn scheduler<T>(f: impl FnOnce(&mut Scheduler) -> T) -> T {
    SCHEDULER.with(|local| {
        let mut scheduler = local.0.borrow_mut();
        f(&mut scheduler)
    })
}

#[cfg(feature = "std")]
pub(crate) fn core_id() -> usize {
    CORE_ID.with(|id| id.get())
}

#[cfg(feature = "std")]
pub(crate) fn set_core_id(id: usize) {
    CORE_ID.with(|cell| cell.set(id));
}

/// Cores with a scheduler slot.
#[cfg(not(feature = "std"))]
pub const MAX_CORES: usize = 2;

#[cfg(not(feature = "std"))]
struct Cores([Local; MAX_CORES]);

// safety: a slot is only ever accessed by the core it belongs to
#[cfg(not(feature = "std"))]
unsafe impl Sync for Cores {}

#[cfg(not(feature = "std"))]
static CORES: Cores = Cores([const { Local(RefCell::new(Scheduler::new())) }; MAX_CORES]);

#[cfg(not(feature = "std"))]
extern "Rust" {
    /// Index of the executing core, provided by the board crate:
    /// ```ignore
    /// #[no_mangle]
    /// fn _cofiber_core_id() -> usize {
    ///     rp2040_pac::SIO::ptr().cpuid().read().bits() as usize
    /// }
    /// ```
    fn _cofiber_core_id() -> usize;
}

/// Borrow the scheduler of the executing core.
///
/// # Panics
/// If called again from within [f], or on a core without a slot.
#[cfg(not(feature = "std"))]
pub(crate) fn scheduler<T>(f: impl FnOnce(&mut Scheduler) -> T) -> T {
    let mut scheduler = CORES.0[core_id()].0.borrow_mut();
    f(&mut scheduler)
}

#[cfg(not(feature = "std"))]
pub(crate) fn core_id() -> usize {
    unsafe { _cofiber_core_id() }
}
