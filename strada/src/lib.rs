pub use strada_core::*;

/// Re-export of the in-process test client, behind the `test-util` feature.
#[cfg(feature = "test-util")]
pub use strada_test as test;

pub mod prelude {
    pub use strada_core::prelude::*;
}
