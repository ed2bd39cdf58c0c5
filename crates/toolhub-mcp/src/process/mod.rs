//! Child process supervision primitives.

mod handle;
mod shutdown;

pub use handle::{ExitInfo, ProcessHandle};
pub use shutdown::terminate;
