pub mod diagnostic;
pub mod expr;
pub mod format;
pub mod signal;
pub mod symbolic;
