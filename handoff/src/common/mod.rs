mod constants;
mod file_util;
mod task_util;

pub use constants::*;
pub(crate) use file_util::*;
pub use task_util::*;
