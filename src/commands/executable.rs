use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Runs a parsed command. A command answers with zero or more frames, written back in order.
pub trait Executable {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error>;
}
