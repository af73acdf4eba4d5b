pub mod bytes;
pub mod error;
pub mod format;

pub use bytes::{ByteReader, ByteWriter};
