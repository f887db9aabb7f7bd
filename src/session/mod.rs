//! Entity/modifier state: types, the scoped store, and its persistence

pub mod persist;
pub mod store;
pub mod types;

pub use persist::*;
pub use store::*;
pub use types::*;

#[cfg(test)]
mod tests;
