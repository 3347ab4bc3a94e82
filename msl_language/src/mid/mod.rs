pub mod extract;
pub mod graph;
pub mod lds;
pub mod rewrite;
pub mod tf;
