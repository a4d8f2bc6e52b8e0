pub mod capsuled_parser;
pub mod decoder;
pub mod dense_capsuled_parser;
pub mod hq_capsuled_parser;
pub mod node_parser;
pub mod ultra_capsuled_parser;
pub mod varbitscale;

pub use self::decoder::{DecoderKind, ScanDecoder};
