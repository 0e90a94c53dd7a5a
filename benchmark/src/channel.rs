use std::rc::Rc;

use cofiber::runtime::{run, spawn, Stack};
use cofiber::sync::channel::Channel;

const SIZE: usize = 64 * 1024;

static PRODUCER: Stack<SIZE> = Stack::new();
static CONSUMER: Stack<SIZE> = Stack::new();

/// Passes [messages] values from one fiber to another.
pub fn ping_pong_cofiber<const N: usize>(messages: usize) {
    let channel: Rc<Channel<usize, N>> = Rc::new(Channel::new());

    spawn(&PRODUCER, {
        let channel = channel.clone();
        move || (0..messages).for_each(|message| channel.send(message))
    })
    .unwrap();

    spawn(&CONSUMER, move || {
        for _ in 0..messages {
            std::hint::black_box(channel.recv());
        }
    })
    .unwrap();

    run().unwrap();
}

/// Passes [messages] values from one OS thread to another.
pub fn ping_pong_crossbeam(capacity: usize, messages: usize) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);

    std::thread::scope(|scope| {
        scope.spawn(move || (0..messages).for_each(|message| sender.send(message).unwrap()));
        scope.spawn(move || {
            for _ in 0..messages {
                std::hint::black_box(receiver.recv().unwrap());
            }
        });
    });
}
