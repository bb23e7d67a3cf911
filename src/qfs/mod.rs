//! QFS/RefPack: the LZ77-family compressor DBPF uses for individual resource
//! payloads.

mod decode;
mod encode;

pub use decode::decompress;
pub use encode::compress;
