//! Time based waiting on top of [`yield_now`].
//!
//! The scheduler never reads a clock, waiting fibers keep yielding until enough time passed.
//! Boards provide their own [`Clock`], e.g. a free running hardware timer.

use core::time::Duration;

use crate::runtime::yield_now;

/// Monotonic time source.
pub trait Clock {
    /// Time elapsed since some fixed point, never decreasing.
    fn now(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Host clock, relative to its creation.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Puts the current fiber to sleep for at least [duration].
///
/// Other fibers of the core run in the meantime.
pub fn sleep(clock: &impl Clock, duration: Duration) {
    let start = clock.now();

    while clock.now().saturating_sub(start) < duration {
        yield_now();
    }
}

/// Yields until [condition] holds.
pub fn poll(mut condition: impl FnMut() -> bool) {
    while !condition() {
        yield_now();
    }
}

/// Yields until [condition] holds or [timeout] passes.
///
/// Returns whether the condition held, it's checked at least once.
pub fn poll_for(clock: &impl Clock, timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = clock.now();

    loop {
        if condition() {
            return true;
        }

        if clock.now().saturating_sub(start) >= timeout {
            return false;
        }

        yield_now();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::runtime::{run, spawn, Stack};

    use super::*;

    const SIZE: usize = 128 * 1024;

    /// Advances by a millisecond every time it's read.
    #[derive(Debug, Default)]
    struct TickingClock(Cell<u64>);

    impl Clock for TickingClock {
        fn now(&self) -> Duration {
            let ticks = self.0.get();
            self.0.set(ticks + 1);
            Duration::from_millis(ticks)
        }
    }

    mod sleep {
        use super::*;

        #[test]
        fn doesnt_hang_when_sleeping_zero() {
            let clock = TickingClock::default();

            sleep(&clock, Duration::ZERO);

            assert_eq!(clock.0.get(), 2);
        }

        #[test]
        fn passes_time() {
            let clock = SystemClock::new();

            sleep(&clock, Duration::from_millis(5));

            assert!(clock.now() >= Duration::from_millis(5));
        }

        #[test]
        fn lets_other_fibers_run() {
            static SLEEPER: Stack<SIZE> = Stack::new();
            static WORKER: Stack<SIZE> = Stack::new();
            let work = Rc::new(Cell::new(0));

            spawn(&SLEEPER, || sleep(&TickingClock::default(), Duration::from_millis(10))).unwrap();
            spawn(&WORKER, {
                let work = work.clone();
                move || {
                    for _ in 0..5 {
                        work.set(work.get() + 1);
                        yield_now();
                    }
                }
            })
            .unwrap();
            run().unwrap();

            assert_eq!(work.get(), 5);
        }
    }

    mod poll {
        use super::*;

        #[test]
        fn returns_once_condition_holds() {
            static WAITER: Stack<SIZE> = Stack::new();
            static SETTER: Stack<SIZE> = Stack::new();
            let flag = Rc::new(Cell::new(false));
            let checks = Rc::new(Cell::new(0));

            spawn(&WAITER, {
                let (flag, checks) = (flag.clone(), checks.clone());
                move || {
                    poll(|| {
                        checks.set(checks.get() + 1);
                        flag.get()
                    })
                }
            })
            .unwrap();
            spawn(&SETTER, {
                let flag = flag.clone();
                move || {
                    yield_now();
                    flag.set(true);
                }
            })
            .unwrap();
            run().unwrap();

            assert_eq!(checks.get(), 3);
        }
    }

    mod poll_for {
        use super::*;

        #[test]
        fn true_when_condition_holds() {
            let clock = TickingClock::default();

            assert!(poll_for(&clock, Duration::ZERO, || true));
        }

        #[test]
        fn false_after_timeout() {
            let clock = TickingClock::default();
            let checks = Cell::new(0);

            let held = poll_for(&clock, Duration::from_millis(3), || {
                checks.set(checks.get() + 1);
                false
            });

            assert!(!held);
            assert_eq!(checks.get(), 3);
        }
    }
}
