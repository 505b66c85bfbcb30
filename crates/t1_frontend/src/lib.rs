#![allow(dead_code)]

pub mod builder;
pub mod error;
pub mod function;
pub mod kernel;
pub mod loader;
pub mod names;
pub mod opcode;
pub mod program;
pub mod types;

pub use loader::{load_program, parse_program};
pub use program::Program;
