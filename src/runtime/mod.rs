//! Cooperative fibers, scheduled round-robin on each core.
//!
//! Every core has its own scheduler in per-core storage.
//! Fibers registered on a core only ever run on that core, and only switch at [`yield_now`].
//!
//! # Examples
//! ```
//! use cofiber::runtime::{run, spawn, yield_now, Stack};
//!
//! static PING: Stack<{ 64 * 1024 }> = Stack::new();
//! static PONG: Stack<{ 64 * 1024 }> = Stack::new();
//!
//! spawn(&PING, || for _ in 0..3 { yield_now() }).unwrap();
//! spawn(&PONG, || for _ in 0..3 { yield_now() }).unwrap();
//!
//! run().unwrap(); // returns once both fibers complete
//! ```

#[cfg(feature = "std")]
use std::any::Any;

use core::mem::{ManuallyDrop, MaybeUninit};

use crate::Error;
use context_switch::Continuation;
use run_queue::RunQueue;
use stack::RawStack;

pub(crate) mod context_switch;
pub(crate) mod local;
mod run_queue;
pub(crate) mod stack;

pub use stack::{Stack, MIN_FREE};

/// Slots of each core's fiber arena.
///
/// The arena lives inline in the core's scheduler, so no fiber is ever heap allocated.
pub const FIBER_CAPACITY: usize = 32;

/// Per-core scheduler configuration.
///
/// ```
/// use cofiber::runtime::{configure, Config};
///
/// configure(Config {
///     fiber_capacity: 4,
///     ..Config::default()
/// })
/// .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Fibers that can be registered at once, at most [`FIBER_CAPACITY`].
    pub fiber_capacity: usize,
}

impl Config {
    const DEFAULT: Config = Config {
        fiber_capacity: FIBER_CAPACITY,
    };
}

impl Default for Config {
    fn default() -> Self {
        Config::DEFAULT
    }
}

/// Handle of a fiber registered with its core's scheduler.
///
/// Unique among the fibers of a core while the fiber runs, may be reused afterwards.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(usize);

/// State of a single core's fibers.
pub(crate) struct Scheduler {
    queue: RunQueue<FiberState, FIBER_CAPACITY>,
    config: Config,
    is_running: bool,
    /// Where the caller of [`run`] is suspended.
    original: MaybeUninit<Continuation>,
    /// Stack of the fiber that just completed, released once execution left it.
    retired: Option<RawStack>,
    #[cfg(feature = "std")]
    panic: Option<Box<dyn Any + Send>>,
}

impl Scheduler {
    /// Usable as a static initializer, nothing is allocated.
    pub(crate) const fn new() -> Self {
        Scheduler {
            queue: RunQueue::new(),
            config: Config::DEFAULT,
            is_running: false,
            original: MaybeUninit::uninit(),
            retired: None,
            #[cfg(feature = "std")]
            panic: None,
        }
    }

    fn register(&mut self, state: FiberState) -> Result<FiberId, (Error, FiberState)> {
        let capacity = self.config.fiber_capacity;
        if self.queue.len() >= capacity {
            return Err((Error::ArenaFull { capacity }, state));
        }

        let key = self.queue.push(state).expect("queue has room");
        log::trace!("registered fiber {key} on core {}", local::core_id());
        Ok(FiberId(key))
    }

    fn configure(&mut self, config: Config) -> Result<(), Error> {
        if self.is_running {
            return Err(Error::SchedulerRunning);
        }
        if !self.queue.is_empty() {
            return Err(Error::SchedulerBusy);
        }
        if config.fiber_capacity > FIBER_CAPACITY {
            return Err(Error::ArenaFull {
                capacity: FIBER_CAPACITY,
            });
        }

        self.config = config;
        Ok(())
    }

    /// Returns where to save the caller and the first fiber to jump to.
    fn start(&mut self) -> Result<Option<(*mut Continuation, *const Continuation)>, Error> {
        if self.is_running {
            return Err(Error::SchedulerRunning);
        }

        let Some(head) = self.queue.start() else {
            return Ok(None);
        };

        self.is_running = true;
        log::debug!("core {} running {} fibers", local::core_id(), self.queue.len());

        let first = self.continuation(head).cast_const();
        Ok(Some((self.original.as_mut_ptr(), first)))
    }

    /// Moves on to the next fiber in the round, [`None`] if there's no other fiber to switch to.
    fn switch(&mut self) -> Option<(*mut Continuation, *const Continuation)> {
        if !self.is_running {
            return None;
        }

        let current = self.queue.current()?;
        let next = self.queue.advance()?;
        log::trace!("switching from fiber {current} to fiber {next}");

        let from = self.continuation(current);
        let to = self.continuation(next).cast_const();
        Some((from, to))
    }

    /// Removes the running fiber, returning where to continue.
    fn complete(&mut self) -> *const Continuation {
        let (state, next) = self.queue.remove_current().expect("completing fiber is current");
        debug_assert!(self.retired.is_none());
        self.retired = Some(state.entry.retire());

        match next {
            Some(key) => {
                log::debug!("fiber completed, {} left", self.queue.len());
                self.continuation(key).cast_const()
            }
            None => {
                log::debug!("last fiber completed");
                self.original.as_ptr()
            }
        }
    }

    fn finish(&mut self) {
        debug_assert!(self.queue.is_empty());
        self.queue.stop();
        self.is_running = false;
        log::debug!("core {} scheduler finished", local::core_id());
    }

    /// Called wherever execution lands after a jump.
    fn release_retired(&mut self) {
        if let Some(stack) = self.retired.take() {
            stack.release();
        }
    }

    fn running(&mut self) -> &mut FiberState {
        let key = self.queue.current().expect("a fiber is running");
        self.queue.get_mut(key).expect("current fiber is registered")
    }

    fn continuation(&mut self, key: run_queue::Key) -> *mut Continuation {
        // the arena is inline in per-core storage, so the pointer stays valid while the fiber is registered
        let state = self.queue.get_mut(key).expect("fiber is registered");
        &mut state.continuation
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("fibers", &self.queue.len())
            .field("config", &self.config)
            .field("is_running", &self.is_running)
            .finish()
    }
}

#[derive(Debug)]
struct FiberState {
    continuation: Continuation,
    entry: Entry,
}

/// Claimed stack with the entry closure stored at its top.
#[derive(Debug)]
struct Entry {
    stack: RawStack,
    /// Drops the closure in place, set until the fiber first runs.
    pending: Option<unsafe fn(&RawStack)>,
}

impl Entry {
    /// Moves the closure off the stack.
    ///
    /// # Safety
    /// [F] must be the type the entry was created with, the closure must not have been taken yet.
    unsafe fn take<F>(&mut self) -> F {
        debug_assert!(self.pending.is_some());
        self.pending = None;
        self.stack.slot::<F>().read()
    }

    /// Gives up the stack without releasing it.
    fn retire(self) -> RawStack {
        let entry = ManuallyDrop::new(self);
        debug_assert!(entry.pending.is_none());
        entry.stack
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        if let Some(drop_closure) = self.pending.take() {
            unsafe { drop_closure(&self.stack) };
        }
        self.stack.release();
    }
}

unsafe fn drop_closure<F>(stack: &RawStack) {
    stack.slot::<F>().drop_in_place();
}

/// A fiber that isn't registered with any scheduler yet.
///
/// Lets one core declare fibers that another core registers with its own scheduler.
///
/// ```
/// use cofiber::runtime::{run, Fiber, Stack};
///
/// static STACK: Stack<{ 64 * 1024 }> = Stack::new();
///
/// let fiber = Fiber::new(&STACK, || println!("hello")).unwrap();
///
/// std::thread::spawn(move || {
///     fiber.start().unwrap();
///     run().unwrap();
/// })
/// .join()
/// .unwrap();
/// ```
#[derive(Debug)]
#[must_use = "fibers do nothing unless started"]
pub struct Fiber {
    state: FiberState,
}

// safety: the entry closure is Send, the stack is a static that only this fiber touches
unsafe impl Send for Fiber {}

impl Fiber {
    /// Creates a fiber running [entry] on [stack], without registering it.
    ///
    /// Dropping it unstarted drops [entry] and releases [stack].
    pub fn new<F, const N: usize>(stack: &'static Stack<N>, entry: F) -> Result<Fiber, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let state = prepare(stack, entry)?;
        Ok(Fiber { state })
    }

    /// Registers with the calling core's scheduler, the fiber runs last in the current round.
    pub fn start(self) -> Result<FiberId, Error> {
        register(self.state)
    }
}

/// Creates a fiber running [entry] on [stack] and registers it with the calling core's scheduler.
///
/// May be called from within a running fiber, the new fiber runs last in the current round.
pub fn spawn<F, const N: usize>(stack: &'static Stack<N>, entry: F) -> Result<FiberId, Error>
where
    F: FnOnce() + 'static,
{
    register(prepare(stack, entry)?)
}

fn prepare<F, const N: usize>(stack: &'static Stack<N>, entry: F) -> Result<FiberState, Error>
where
    F: FnOnce() + 'static,
{
    let stack = stack.claim()?;

    if !stack.fits::<F>() {
        stack.release();
        return Err(Error::StackTooSmall { size: N });
    }

    let slot = stack.slot::<F>();
    unsafe { slot.write(entry) };
    let continuation = unsafe { context_switch::prepare_stack(slot.cast(), fiber_trampoline::<F>) };

    Ok(FiberState {
        continuation,
        entry: Entry {
            stack,
            pending: Some(drop_closure::<F>),
        },
    })
}

fn register(state: FiberState) -> Result<FiberId, Error> {
    // a rejected fiber is dropped outside the borrow, its closure may call back into the runtime
    local::scheduler(|scheduler| scheduler.register(state)).map_err(|(error, state)| {
        drop(state);
        error
    })
}

extern "C" fn fiber_trampoline<F: FnOnce()>() -> ! {
    let entry: F = local::scheduler(|scheduler| {
        scheduler.release_retired();
        unsafe { scheduler.running().entry.take::<F>() }
    });

    run_entry(entry);

    let next = local::scheduler(|scheduler| scheduler.complete());
    let mut dummy = MaybeUninit::uninit();
    unsafe { context_switch::jump(dummy.as_mut_ptr(), next) };
    unreachable!()
}

#[cfg(feature = "std")]
fn run_entry<F: FnOnce()>(entry: F) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry));

    if let Err(payload) = result {
        log::error!("fiber {:?} panicked on core {}", current(), local::core_id());
        local::scheduler(|scheduler| {
            // the first panic wins, later ones are only logged
            scheduler.panic.get_or_insert(payload);
        });
    }
}

#[cfg(not(feature = "std"))]
fn run_entry<F: FnOnce()>(entry: F) {
    entry();
}

/// Runs the calling core's fibers until all of them complete.
///
/// Returns immediately if no fiber is registered.
///
/// # Errors
/// [`Error::SchedulerRunning`] when called from within a fiber.
///
/// # Panics
/// With the first panic of a fiber, once the remaining fibers completed.
pub fn run() -> Result<(), Error> {
    let Some((original, first)) = local::scheduler(|scheduler| scheduler.start())? else {
        return Ok(());
    };

    unsafe { context_switch::jump(original, first) };

    local::scheduler(|scheduler| {
        scheduler.release_retired();
        scheduler.finish();
    });

    #[cfg(feature = "std")]
    if let Some(payload) = local::scheduler(|scheduler| scheduler.panic.take()) {
        std::panic::resume_unwind(payload);
    }

    Ok(())
}

/// Suspends the running fiber, letting every other fiber of this core run once.
///
/// Does nothing when it's the only fiber, or when called outside of a running scheduler.
pub fn yield_now() {
    let Some((from, to)) = local::scheduler(|scheduler| scheduler.switch()) else {
        return;
    };

    unsafe { context_switch::jump(from, to) };

    local::scheduler(|scheduler| scheduler.release_retired());
}

/// Replaces the calling core's configuration.
///
/// # Errors
/// [`Error::SchedulerRunning`] from within a fiber, [`Error::SchedulerBusy`] while fibers are registered,
/// [`Error::ArenaFull`] when asking for more than [`FIBER_CAPACITY`] fibers.
pub fn configure(config: Config) -> Result<(), Error> {
    local::scheduler(|scheduler| scheduler.configure(config))
}

/// The fiber calling this, [`None`] outside of fibers.
pub fn current() -> Option<FiberId> {
    local::scheduler(|scheduler| {
        if scheduler.is_running {
            scheduler.queue.current().map(FiberId)
        } else {
            None
        }
    })
}

/// Fibers registered with the calling core's scheduler, including the running one.
pub fn fiber_count() -> usize {
    local::scheduler(|scheduler| scheduler.queue.len())
}

/// Whether the calling core's scheduler is running fibers.
pub fn is_running() -> bool {
    local::scheduler(|scheduler| scheduler.is_running)
}
