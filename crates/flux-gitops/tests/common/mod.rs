//! Shared helpers for the integration tests.

pub mod builders;
pub mod fakes;

#[allow(unused_imports)]
pub use builders::*;
#[allow(unused_imports)]
pub use fakes::*;
