//! Cache-aware concurrent sampling for fpbench.

pub mod local;
pub mod sampler;

pub use local::*;
pub use sampler::*;
