// The compiler is a library, diagnostics are returned to the caller instead of printed.
#![deny(clippy::print_stdout)]

pub mod config;
pub mod error;
pub mod model;
pub mod sim;
pub mod table;

pub mod back;
pub mod front;
pub mod mid;
pub mod util;
