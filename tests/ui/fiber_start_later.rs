use std::sync::atomic::{AtomicBool, Ordering};

static RAN: AtomicBool = AtomicBool::new(false);

/// Declared here, registered elsewhere.
#[cofiber::fiber(stack = 65536, start = later)]
fn worker() {
    RAN.store(true, Ordering::Relaxed);
}

fn main() {
    let fiber: cofiber::Fiber = worker().unwrap();

    std::thread::spawn(move || {
        fiber.start().unwrap();
        cofiber::run().unwrap();
    })
    .join()
    .unwrap();

    assert!(RAN.load(Ordering::Relaxed));
}
