pub mod indent;
pub mod swrite;
