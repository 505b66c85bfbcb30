#[macro_use]
pub mod lines;

pub mod progress_logger;
