use cofiber::runtime::{run, spawn, yield_now, Stack};

const SIZE: usize = 64 * 1024;

static STACKS: [Stack<SIZE>; 8] = [const { Stack::new() }; 8];

/// [fibers] fibers each yielding [yields] times.
pub fn yield_cofiber(fibers: usize, yields: usize) {
    for stack in &STACKS[..fibers] {
        spawn(stack, move || {
            for _ in 0..yields {
                yield_now();
            }
        })
        .unwrap();
    }

    run().unwrap();
}

/// Same number of hand-offs between OS threads.
pub fn yield_threads(threads: usize, yields: usize) {
    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(move || {
                for _ in 0..yields {
                    std::thread::yield_now();
                }
            });
        }
    });
}

/// Registering and completing a fiber that does nothing.
pub fn spawn_complete_cofiber() {
    spawn(&STACKS[0], || {}).unwrap();
    run().unwrap();
}
