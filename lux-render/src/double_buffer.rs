//! Producer/consumer frame handoff for the threaded engine
//!
//! The render thread composites into `render`; consumers copy out of
//! `copy`. `flip` swaps the two allocations. Each half has its own mutex
//! so a consumer copying a frame never waits on a tick in progress, only
//! on the swap itself.

use crate::color::{ColorBuffer, ColorSpace};
use crate::error::RenderResult;
use parking_lot::{Mutex, MutexGuard};
use std::mem;

pub struct DoubleBuffer {
    render: Mutex<ColorBuffer>,
    copy: Mutex<ColorBuffer>,
}

impl DoubleBuffer {
    pub fn new(space: ColorSpace, len: usize) -> Self {
        Self {
            render: Mutex::new(ColorBuffer::filled(space, len, crate::color::BLACK8)),
            copy: Mutex::new(ColorBuffer::filled(space, len, crate::color::BLACK8)),
        }
    }

    /// Producer half, held for the duration of one tick
    pub(crate) fn render(&self) -> MutexGuard<'_, ColorBuffer> {
        self.render.lock()
    }

    /// Publish the render half to consumers
    pub fn flip(&self) {
        let mut render = self.render.lock();
        let mut copy = self.copy.lock();
        mem::swap(&mut *render, &mut *copy);
    }

    /// Copy the last published frame into `dst`
    pub fn copy_into(&self, dst: &mut ColorBuffer) {
        dst.assign(&self.copy.lock());
    }

    /// Run `f` against the published frame without copying
    pub fn with_copy<R>(&self, f: impl FnOnce(&ColorBuffer) -> R) -> R {
        f(&self.copy.lock())
    }

    /// Copy the published frame into `dst`, which must match it
    pub fn copy_into_matching(&self, dst: &mut ColorBuffer) -> RenderResult<()> {
        let copy = self.copy.lock();
        dst.check_compatible(&copy)?;
        dst.assign(&copy);
        Ok(())
    }

    /// Reallocate both halves
    pub(crate) fn reset(&self, space: ColorSpace, len: usize) {
        let mut render = self.render.lock();
        let mut copy = self.copy.lock();
        *render = ColorBuffer::filled(space, len, crate::color::BLACK8);
        *copy = ColorBuffer::filled(space, len, crate::color::BLACK8);
    }
}
