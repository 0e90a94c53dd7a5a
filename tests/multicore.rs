use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cofiber::multicore::{core_id, host, Core1, Mailbox};
use cofiber::runtime::{run, spawn, yield_now, Stack};
use cofiber::sync::spin_lock::SpinLock;

const CORE: usize = 256 * 1024;
const FIBER: usize = 64 * 1024;

#[test]
fn runs_entry_on_core_1() {
    static CORE1_STACK: Stack<CORE> = Stack::new();
    let seen = Arc::new(SpinLock::new(None));

    let (mailbox, core1_thread) = host::power_on().unwrap();
    Core1::new(mailbox)
        .run(&CORE1_STACK, {
            let seen = seen.clone();
            move || *seen.lock() = Some(core_id())
        })
        .unwrap();
    core1_thread.join().unwrap();

    assert_eq!(*seen.lock(), Some(1));
    assert_eq!(core_id(), 0);
    assert!(!CORE1_STACK.is_claimed());
}

#[test]
fn restores_mailbox_interrupt() {
    static CORE1_STACK: Stack<CORE> = Stack::new();

    let (mailbox, core1_thread) = host::power_on().unwrap();
    let mut core1 = Core1::new(mailbox);
    assert!(core1.mailbox().interrupt_enabled());

    core1.run(&CORE1_STACK, || {}).unwrap();

    assert!(core1.mailbox().interrupt_enabled());
    core1_thread.join().unwrap();
}

#[test]
fn boots_despite_leftover_word() {
    static CORE1_STACK: Stack<CORE> = Stack::new();
    let booted = Arc::new(AtomicBool::new(false));

    let (mailbox, core1_thread) = host::power_on_with_leftover(0xdead_beef).unwrap();
    Core1::new(mailbox)
        .with_vector_table(0x1000_0100)
        .run(&CORE1_STACK, {
            let booted = booted.clone();
            move || booted.store(true, Ordering::Relaxed)
        })
        .unwrap();
    core1_thread.join().unwrap();

    assert!(booted.load(Ordering::Relaxed));
}

#[test]
fn cores_keep_their_own_fibers() {
    static CORE1_STACK: Stack<CORE> = Stack::new();
    static CORE0_FIBERS: [Stack<FIBER>; 3] = [Stack::new(), Stack::new(), Stack::new()];
    static CORE1_FIBERS: [Stack<FIBER>; 3] = [Stack::new(), Stack::new(), Stack::new()];

    let observed = Arc::new(SpinLock::new(Vec::new()));

    let (mailbox, core1_thread) = host::power_on().unwrap();
    Core1::new(mailbox)
        .run(&CORE1_STACK, {
            let observed = observed.clone();
            move || {
                // registration order reversed relative to core 0
                for (index, stack) in CORE1_FIBERS.iter().enumerate().rev() {
                    let observed = observed.clone();
                    spawn(stack, move || {
                        for _ in 0..100 {
                            observed.lock_yielding().push((1, index, core_id()));
                            yield_now();
                        }
                    })
                    .unwrap();
                }
                run().unwrap();
            }
        })
        .unwrap();

    for (index, stack) in CORE0_FIBERS.iter().enumerate() {
        let observed = observed.clone();
        spawn(stack, move || {
            for _ in 0..100 {
                observed.lock_yielding().push((0, index, core_id()));
                yield_now();
            }
        })
        .unwrap();
    }
    run().unwrap();
    core1_thread.join().unwrap();

    let observed = observed.lock();
    assert_eq!(observed.len(), 600);
    assert!(observed.iter().all(|&(core, _, running_on)| core == running_on));
}

#[test]
fn lock_serializes_cores() {
    static CORE1_STACK: Stack<CORE> = Stack::new();
    static COUNTER: SpinLock<u64> = SpinLock::new(0);

    let (mailbox, core1_thread) = host::power_on().unwrap();
    Core1::new(mailbox)
        .run(&CORE1_STACK, || {
            for _ in 0..10_000 {
                *COUNTER.lock() += 1;
            }
        })
        .unwrap();

    for _ in 0..10_000 {
        *COUNTER.lock() += 1;
    }
    core1_thread.join().unwrap();

    assert_eq!(*COUNTER.lock(), 20_000);
}

#[test]
fn mailbox_usable_after_boot() {
    static CORE1_STACK: Stack<CORE> = Stack::new();

    let (mailbox, core1_thread) = host::power_on().unwrap();
    let mut core1 = Core1::new(mailbox);
    core1
        .run(&CORE1_STACK, || {
            host::with_mailbox(|mailbox| {
                let word = mailbox.read_blocking();
                mailbox.write_blocking(word * 2);
            })
        })
        .unwrap();

    core1.mailbox().write_blocking(21);

    assert_eq!(core1.mailbox().read_blocking(), 42);
    core1_thread.join().unwrap();
}

#[test]
fn core_1_panic_reaches_join() {
    static CORE1_STACK: Stack<{ 4 * CORE }> = Stack::new();

    let (mailbox, core1_thread) = host::power_on().unwrap();
    Core1::new(mailbox).run(&CORE1_STACK, || panic!("core 1 failed")).unwrap();

    let payload = core1_thread.join().unwrap_err();

    assert_eq!(payload.downcast_ref::<&str>(), Some(&"core 1 failed"));
    assert!(!CORE1_STACK.is_claimed());
}

#[test]
fn core_1_fiber_state_stays_local() {
    static CORE1_STACK: Stack<CORE> = Stack::new();
    static FIBER_STACK: Stack<FIBER> = Stack::new();
    let order = Arc::new(SpinLock::new(Vec::new()));

    let (mailbox, core1_thread) = host::power_on().unwrap();
    Core1::new(mailbox)
        .run(&CORE1_STACK, {
            let order = order.clone();
            move || {
                // fibers on one core share state without locking
                let local = Rc::new(RefCell::new(Vec::new()));
                spawn(&FIBER_STACK, {
                    let local = local.clone();
                    move || local.borrow_mut().push("fiber")
                })
                .unwrap();
                local.borrow_mut().push("entry");
                run().unwrap();

                order.lock().extend(local.borrow().iter().copied());
            }
        })
        .unwrap();
    core1_thread.join().unwrap();

    assert_eq!(*order.lock(), ["entry", "fiber"]);
    assert_eq!(cofiber::runtime::fiber_count(), 0);
}
