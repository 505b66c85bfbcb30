// When 'lib.rs' exists, cargo treats 'main.rs' as a separate crate
use t1_common::report_error::Reportable;
use t1_compiler::cli::Config;
use t1_compiler::handle_config;

use std::io;

fn main() {
    better_panic::install();

    let config = Config::from_args();
    if let Err(err) = handle_config(config) {
        let _ = err.report(&mut io::stderr().lock());
        std::process::exit(err.exit_status());
    }
}
