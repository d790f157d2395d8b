mod math;
mod reader;

pub use math::*;
pub use reader::{Error as ReaderError, Reader, Result as ReaderResult};
