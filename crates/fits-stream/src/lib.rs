pub mod bintable;
pub mod block;
pub mod endian;
pub mod error;
pub mod hdu;
pub mod header;
pub mod image;
pub mod rice;
pub mod table;
pub mod tabular;
pub mod tiled;
pub mod value;

pub use block::{BlockReader, SharedSource, BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use error::{Error, Result};
pub use hdu::{parse, parse_bytes, DataUnit, Document, Hdu};
pub use header::{Header, HeaderParser, Warning};
pub use image::{Image, Pixels};
pub use rice::RiceDecoder;
pub use tabular::Cell;
pub use tiled::CompressedImage;
pub use value::Value;
