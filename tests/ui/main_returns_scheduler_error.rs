use std::cell::Cell;
use std::rc::Rc;

static STACK: cofiber::Stack<65536> = cofiber::Stack::new();

#[cofiber::main]
fn nested() -> Result<(), cofiber::Error> {
    Ok(())
}

fn main() {
    let result = Rc::new(Cell::new(None));

    cofiber::spawn(&STACK, {
        let result = result.clone();
        move || result.set(Some(nested()))
    })
    .unwrap();
    cofiber::run().unwrap();

    assert_eq!(result.get(), Some(Err(cofiber::Error::SchedulerRunning)));
}
