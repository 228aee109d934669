pub mod commands;
pub mod common;

pub use common::StoreContext;
