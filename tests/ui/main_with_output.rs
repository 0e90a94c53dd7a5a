static STACK: cofiber::Stack<65536> = cofiber::Stack::new();

#[cofiber::main]
fn main() -> Result<(), cofiber::Error> {
    cofiber::spawn(&STACK, || cofiber::yield_now())?;
    Ok(())
}
