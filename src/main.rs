//! suitest CLI with the bundled demonstration suites.

use std::process::ExitCode;

use suitest::Catalog;

#[path = "../demos/arithmetic.rs"]
mod arithmetic;
#[path = "../demos/errors.rs"]
mod errors;
#[path = "../demos/lifecycle.rs"]
mod lifecycle;

fn main() -> ExitCode {
    let catalog = Catalog::new()
        .with_unit(arithmetic::SOURCE_UNIT)
        .with_unit(errors::SOURCE_UNIT)
        .with_unit(lifecycle::SOURCE_UNIT);
    suitest::cli::main_with(catalog)
}
