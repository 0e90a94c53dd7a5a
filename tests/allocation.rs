use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::rc::Rc;

use cofiber::runtime::{configure, fiber_count, run, spawn, yield_now, Config, Stack};
use cofiber::sync::channel::Channel;

const SIZE: usize = 64 * 1024;

/// Counts the bytes each thread allocates.
struct CountingAllocator;

thread_local! {
    static ALLOCATED: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATED.try_with(|bytes| bytes.set(bytes.get() + layout.size()));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

/// Heap bytes allocated by [f] on the calling thread.
fn allocated_by(f: impl FnOnce()) -> usize {
    // first touch of the scheduler may register a thread local destructor
    let _ = fiber_count();

    let before = ALLOCATED.with(Cell::get);
    f();
    ALLOCATED.with(Cell::get) - before
}

#[test]
fn first_spawn_doesnt_allocate() {
    static STACK: Stack<SIZE> = Stack::new();

    let bytes = allocated_by(|| {
        spawn(&STACK, || {}).unwrap();
    });

    assert_eq!(bytes, 0);
    run().unwrap();
}

#[test]
fn scheduling_doesnt_allocate() {
    static FIRST: Stack<SIZE> = Stack::new();
    static SECOND: Stack<SIZE> = Stack::new();
    static NESTED: Stack<SIZE> = Stack::new();

    let bytes = allocated_by(|| {
        spawn(&FIRST, || {
            spawn(&NESTED, yield_now).unwrap();
            for _ in 0..3 {
                yield_now();
            }
        })
        .unwrap();
        spawn(&SECOND, || {
            for _ in 0..3 {
                yield_now();
            }
        })
        .unwrap();
        run().unwrap();
    });

    assert_eq!(bytes, 0);
    assert_eq!(fiber_count(), 0);
}

#[test]
fn channel_hand_off_doesnt_allocate() {
    static PRODUCER: Stack<SIZE> = Stack::new();
    static CONSUMER: Stack<SIZE> = Stack::new();
    let channel = Rc::new(Channel::<u32, 2>::new());
    let total = Rc::new(Cell::new(0));

    let bytes = allocated_by(|| {
        spawn(&PRODUCER, {
            let channel = channel.clone();
            move || (1..=10).for_each(|n| channel.send(n))
        })
        .unwrap();
        spawn(&CONSUMER, {
            let (channel, total) = (channel.clone(), total.clone());
            move || (1..=10).for_each(|_| total.set(total.get() + channel.recv()))
        })
        .unwrap();
        run().unwrap();
    });

    assert_eq!(bytes, 0);
    assert_eq!(total.get(), 55);
}

#[test]
fn configure_doesnt_allocate() {
    let bytes = allocated_by(|| configure(Config { fiber_capacity: 4 }).unwrap());

    assert_eq!(bytes, 0);
}
