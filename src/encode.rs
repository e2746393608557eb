use std::path::PathBuf;

use crate::{error::ReelResult, render::RenderedFrame};

/// Consumer of rendered frames.
///
/// Frames arrive in strictly ascending index order, starting at 0 with no gaps. `finish` is
/// called once after the last frame and returns the produced artifact. When a pass fails or is
/// cancelled, `abort` is called instead so the encoder can discard partial output.
pub trait Encoder {
    fn encode_frame(&mut self, frame: &RenderedFrame) -> ReelResult<()>;

    fn finish(&mut self) -> ReelResult<PathBuf>;

    fn abort(&mut self) {}
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn encode_frame(&mut self, frame: &RenderedFrame) -> ReelResult<()> {
        (**self).encode_frame(frame)
    }

    fn finish(&mut self) -> ReelResult<PathBuf> {
        (**self).finish()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}
