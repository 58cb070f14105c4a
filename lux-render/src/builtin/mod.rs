//! Small built-in patterns and effects for demos and tests

mod effects;
mod patterns;

pub use effects::{Dim, Invert};
pub use patterns::{Chase, Rainbow, Solid};
