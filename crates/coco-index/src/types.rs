use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{CocoError, Result};
use crate::mask::MaskCodec;
use crate::tree::{self, Object};

/// Top-level COCO dataset structure.
///
/// Each section is optional so that a document without e.g. `annotations`
/// can be told apart from one with an empty `annotations` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licenses: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
}

impl Dataset {
    /// Build a dataset from a parsed document tree.
    pub fn from_tree(tree: &Value) -> Result<Self> {
        let obj = tree.as_object().ok_or(CocoError::WrongType {
            record: "dataset",
            field: "<root>",
            expected: "object",
        })?;

        Ok(Dataset {
            info: obj.get("info").cloned(),
            licenses: obj.get("licenses").cloned(),
            images: records(obj, "images")?,
            annotations: records(obj, "annotations")?,
            categories: records(obj, "categories")?,
        })
    }

    pub fn images(&self) -> &[Image] {
        self.images.as_deref().unwrap_or_default()
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.annotations.as_deref().unwrap_or_default()
    }

    pub fn categories(&self) -> &[Category] {
        self.categories.as_deref().unwrap_or_default()
    }
}

fn records<T>(obj: &Object, name: &'static str) -> Result<Option<Vec<T>>>
where
    T: for<'a> TryFrom<&'a Value, Error = CocoError>,
{
    tree::section(obj, name)?
        .map(|values| values.iter().map(T::try_from).collect::<Result<Vec<T>>>())
        .transpose()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Image {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub file_name: String,
}

impl TryFrom<&Value> for Image {
    type Error = CocoError;

    fn try_from(value: &Value) -> Result<Self> {
        const RECORD: &str = "image";
        let obj = tree::as_object(value, RECORD)?;
        let width = tree::get_u32(obj, RECORD, "width")?;
        let height = tree::get_u32(obj, RECORD, "height")?;
        if width == 0 || height == 0 {
            return Err(CocoError::WrongType {
                record: RECORD,
                field: if width == 0 { "width" } else { "height" },
                expected: "positive integer",
            });
        }
        Ok(Image {
            id: tree::get_u64(obj, RECORD, "id")?,
            width,
            height,
            file_name: tree::get_str(obj, RECORD, "file_name")?.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    pub area: f64,
    #[serde(serialize_with = "serialize_iscrowd")]
    pub iscrowd: bool,
    pub bbox: [f64; 4],
    pub segmentation: Segmentation,
    /// Detection score (present only in result annotations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

fn serialize_iscrowd<S>(iscrowd: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(u8::from(*iscrowd))
}

impl TryFrom<&Value> for Annotation {
    type Error = CocoError;

    fn try_from(value: &Value) -> Result<Self> {
        const RECORD: &str = "annotation";
        let obj = tree::as_object(value, RECORD)?;
        let area = tree::get_f64(obj, RECORD, "area")?;
        if area < 0.0 {
            return Err(CocoError::WrongType {
                record: RECORD,
                field: "area",
                expected: "non-negative number",
            });
        }
        Ok(Annotation {
            id: tree::get_id(obj, RECORD, "id")?,
            image_id: tree::get_u64(obj, RECORD, "image_id")?,
            category_id: tree::get_u64(obj, RECORD, "category_id")?,
            area,
            iscrowd: tree::get_flag(obj, RECORD, "iscrowd")?,
            bbox: tree::bbox(obj, RECORD)?,
            segmentation: Segmentation::try_from(tree::field(obj, RECORD, "segmentation")?)?,
            score: tree::opt_f64(obj, RECORD, "score")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// Polygon format: list of polygons, each a flat list of [x, y, x, y, ...] coordinates.
    Polygon(Vec<Vec<f64>>),
    /// Uncompressed RLE format.
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
    /// Compressed RLE format (as stored in COCO JSON results).
    CompressedRle { size: [u32; 2], counts: String },
}

impl Default for Segmentation {
    fn default() -> Self {
        Segmentation::Polygon(Vec::new())
    }
}

impl TryFrom<&Value> for Segmentation {
    type Error = CocoError;

    fn try_from(value: &Value) -> Result<Self> {
        const RECORD: &str = "segmentation";
        let shape = |detail: &str| CocoError::Shape {
            record: "annotation",
            field: RECORD,
            detail: detail.to_owned(),
        };

        match value {
            Value::Array(polygons) => polygons
                .iter()
                .map(|poly| match poly {
                    Value::Array(coords) => tree::f64_array(coords, RECORD, "polygon"),
                    _ => Err(shape("polygon list entries must be arrays of numbers")),
                })
                .collect::<Result<_>>()
                .map(Segmentation::Polygon),
            Value::Object(obj) => match obj.get("counts") {
                Some(Value::Array(counts)) => {
                    let counts = counts
                        .iter()
                        .map(|c| {
                            c.as_u64()
                                .and_then(|c| u32::try_from(c).ok())
                                .ok_or_else(|| shape("RLE counts must be non-negative integers"))
                        })
                        .collect::<Result<_>>()?;
                    Ok(Segmentation::UncompressedRle {
                        size: tree::size(obj, RECORD)?,
                        counts,
                    })
                }
                Some(Value::String(counts)) => Ok(Segmentation::CompressedRle {
                    size: tree::size(obj, RECORD)?,
                    counts: counts.clone(),
                }),
                Some(_) => Err(shape("RLE counts must be an integer array or a string")),
                None => Err(shape("RLE object without counts")),
            },
            _ => Err(shape("expected a polygon list or an RLE object")),
        }
    }
}

impl Segmentation {
    /// Mask size `[height, width]` for run-length variants.
    pub fn size(&self) -> Option<[u32; 2]> {
        match self {
            Segmentation::Polygon(_) => None,
            Segmentation::UncompressedRle { size, .. } | Segmentation::CompressedRle { size, .. } => {
                Some(*size)
            }
        }
    }

    /// Convert a run-length segmentation to an [`Rle`] through `codec`.
    ///
    /// Polygons are rejected: rasterizing them is not this crate's job.
    pub fn to_rle(&self, codec: &impl MaskCodec) -> Result<Rle> {
        match self {
            Segmentation::Polygon(_) => Err(CocoError::Shape {
                record: "annotation",
                field: "segmentation",
                detail: "expected a run-length mask, found polygons".to_owned(),
            }),
            Segmentation::UncompressedRle { size, counts } => Ok(Rle {
                h: size[0],
                w: size[1],
                counts: counts.clone(),
            }),
            Segmentation::CompressedRle { size, counts } => {
                codec.decompress(counts, size[0], size[1])
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub supercategory: String,
}

impl TryFrom<&Value> for Category {
    type Error = CocoError;

    fn try_from(value: &Value) -> Result<Self> {
        const RECORD: &str = "category";
        let obj = tree::as_object(value, RECORD)?;
        Ok(Category {
            id: tree::get_u64(obj, RECORD, "id")?,
            name: tree::get_str(obj, RECORD, "name")?.to_owned(),
            supercategory: tree::get_str(obj, RECORD, "supercategory")?.to_owned(),
        })
    }
}

/// Run-length encoding for masks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    /// Run counts: alternating runs of 0s and 1s, starting with 0s.
    pub counts: Vec<u32>,
}
