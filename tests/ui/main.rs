use std::cell::Cell;
use std::rc::Rc;

static STACK: cofiber::Stack<65536> = cofiber::Stack::new();

#[cofiber::main]
fn main() {
    let ran = Rc::new(Cell::new(false));

    cofiber::spawn(&STACK, {
        let ran = ran.clone();
        move || ran.set(true)
    })
    .unwrap();

    assert!(!ran.get());
}
