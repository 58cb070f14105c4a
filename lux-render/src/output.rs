//! Output collaborator seam
//!
//! Outputs receive the finished master frame once per rendered tick.
//! Wire encoders and transports live in the `lux-output` crate.

use crate::color::ColorBuffer;
use crate::error::RenderResult;

pub trait Output: Send {
    fn name(&self) -> &str;

    /// Hand over one finished frame
    ///
    /// The engine logs a failure and carries on with the next output.
    fn send(&mut self, frame: &ColorBuffer) -> RenderResult<()>;
}
