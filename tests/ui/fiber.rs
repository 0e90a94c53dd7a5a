use std::sync::atomic::{AtomicUsize, Ordering};

static TURNS: AtomicUsize = AtomicUsize::new(0);

#[cofiber::fiber(stack = 65536)]
fn ping() {
    for _ in 0..3 {
        TURNS.fetch_add(1, Ordering::Relaxed);
        cofiber::yield_now();
    }
}

#[cofiber::fiber(stack = 64 * 1024)]
pub(crate) fn pong() {
    for _ in 0..3 {
        TURNS.fetch_add(1, Ordering::Relaxed);
        cofiber::yield_now();
    }
}

fn main() {
    let ping: cofiber::FiberId = ping().unwrap();
    let pong = pong().unwrap();
    assert_ne!(ping, pong);

    cofiber::run().unwrap();

    assert_eq!(TURNS.load(Ordering::Relaxed), 6);
}
