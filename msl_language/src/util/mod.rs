pub mod arena;
pub mod data;
pub mod fixed;
pub mod int;
pub mod range;

#[macro_export]
macro_rules! throw {
    ($e:expr) => {
        return Err($e.into())
    };
}
