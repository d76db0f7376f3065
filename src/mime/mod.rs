//! Message decoding: RFC 2047 header words and text/HTML body extraction.

pub mod body;
pub mod encoded_word;

pub use body::{BodyDecoder, DecodedBody, PartPrecedence};
pub use encoded_word::decode_subject;
