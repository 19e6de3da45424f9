pub mod geodesy;
pub mod graph;
pub mod transit;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
