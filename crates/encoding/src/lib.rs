#![allow(clippy::uninlined_format_args)]

pub mod codec;
pub mod lz77;
pub mod rle;
