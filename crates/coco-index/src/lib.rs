//! In-memory index, query engine and result loader for COCO-style
//! annotation datasets.

pub mod coco;
pub mod error;
pub mod mask;
mod results;
mod tree;
pub mod types;

pub use coco::COCO;
pub use error::{CocoError, RecordKind, Result};
pub use mask::{MaskCodec, RleCodec};
pub use types::{Annotation, Category, Dataset, Image, Rle, Segmentation};
