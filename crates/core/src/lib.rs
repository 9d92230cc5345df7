//! Expression model shared by every fpbench crate.

pub mod expr;
pub mod fpcore;
pub mod key;
pub mod sample;
pub mod synth;

pub use expr::*;
pub use fpcore::*;
pub use key::*;
pub use sample::*;
pub use synth::*;
