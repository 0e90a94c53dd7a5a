#[test]
fn expansions_compile_and_run() {
    let cases = trybuild::TestCases::new();
    cases.pass("tests/ui/*.rs");
}
