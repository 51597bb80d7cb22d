//! Loading detector output as a new, fully indexed store.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::{json, Value};

use crate::coco::COCO;
use crate::error::{CocoError, Result};
use crate::mask::{MaskCodec, RleCodec};
use crate::tree::{self, Object};
use crate::types::{Annotation, Dataset, Segmentation};

const RECORD: &str = "result";

/// How a results array is normalized, decided by its first record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultKind {
    Bbox,
    Segm,
}

impl ResultKind {
    fn detect(first: &Value) -> Result<Self> {
        let obj = tree::as_object(first, RECORD)?;
        if has_bbox(obj) {
            Ok(ResultKind::Bbox)
        } else if obj.contains_key("segmentation") {
            Ok(ResultKind::Segm)
        } else if obj.contains_key("keypoints") {
            Err(CocoError::UnsupportedResults("keypoint results".into()))
        } else if obj.contains_key("caption") {
            Err(CocoError::UnsupportedResults("caption results".into()))
        } else {
            Err(CocoError::UnsupportedResults(
                "first record has neither 'bbox' nor 'segmentation'".into(),
            ))
        }
    }

    fn name(self) -> &'static str {
        match self {
            ResultKind::Bbox => "bbox",
            ResultKind::Segm => "segmentation",
        }
    }
}

fn has_bbox(obj: &Object) -> bool {
    matches!(obj.get("bbox"), Some(Value::Array(bb)) if !bb.is_empty())
}

impl COCO {
    /// Load detection/result annotations into a new COCO object.
    ///
    /// The result file can be a JSON array of annotation dicts, or a JSON object
    /// with an `annotations` field. The new store carries copies of this
    /// store's images and categories.
    pub fn load_res(&self, res_file: &Path) -> Result<COCO> {
        log::info!("Loading and preparing results...");
        let file = File::open(res_file).map_err(|e| CocoError::from(e).in_file(res_file))?;
        let tree: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CocoError::from(e).in_file(res_file))?;
        self.load_res_tree(tree).map_err(|e| e.in_file(res_file))
    }

    /// [`load_res`](Self::load_res) over an already-parsed results tree.
    pub fn load_res_tree(&self, tree: Value) -> Result<COCO> {
        self.load_res_with(tree, &RleCodec)
    }

    /// Normalize a results tree with `codec` supplying mask-derived fields.
    ///
    /// The first record decides the format for the whole array:
    /// * a non-empty `bbox`: `area` is `w * h` and a rectangular polygon is
    ///   synthesized where `segmentation` is missing;
    /// * otherwise a `segmentation` run-length mask: `area` comes from the
    ///   codec, and so does `bbox` when missing.
    ///
    /// Every record gets `id = position + 1` and `iscrowd = 0`. Records that
    /// do not follow the first record's format are rejected.
    pub fn load_res_with(&self, tree: Value, codec: &impl MaskCodec) -> Result<COCO> {
        let mut records = match tree {
            Value::Array(records) => records,
            Value::Object(mut obj) => match obj.remove("annotations") {
                Some(Value::Array(records)) => records,
                _ => {
                    return Err(CocoError::WrongType {
                        record: RECORD,
                        field: "annotations",
                        expected: "array",
                    })
                }
            },
            _ => {
                return Err(CocoError::WrongType {
                    record: RECORD,
                    field: "<root>",
                    expected: "array of result records",
                })
            }
        };

        let kind = ResultKind::detect(records.first().ok_or(CocoError::EmptyResults)?)?;
        log::debug!("normalizing {} {} results", records.len(), kind.name());

        for (index, record) in records.iter_mut().enumerate() {
            let obj = record.as_object_mut().ok_or(CocoError::WrongType {
                record: RECORD,
                field: "<record>",
                expected: "object",
            })?;
            match kind {
                ResultKind::Bbox => fill_from_bbox(obj, index)?,
                ResultKind::Segm => fill_from_mask(obj, index, codec)?,
            }
            obj.insert("id".into(), json!(index + 1));
            obj.insert("iscrowd".into(), json!(0));
        }

        let annotations = records
            .iter()
            .map(Annotation::try_from)
            .collect::<Result<Vec<_>>>()?;

        if self.dataset().images.is_some() {
            let unknown = annotations
                .iter()
                .filter(|ann| self.get_img(ann.image_id).is_none())
                .count();
            if unknown > 0 {
                log::warn!("{} results refer to images missing from the dataset", unknown);
            }
        }

        let dataset = Dataset {
            info: self.dataset().info.clone(),
            licenses: self.dataset().licenses.clone(),
            images: self.dataset().images.clone(),
            annotations: Some(annotations),
            categories: self.dataset().categories.clone(),
        };
        Ok(COCO::from_dataset(dataset))
    }
}

fn fill_from_bbox(obj: &mut Object, index: usize) -> Result<()> {
    if !has_bbox(obj) {
        return Err(CocoError::MixedResults {
            index,
            expected: "bbox",
        });
    }
    let [x1, y1, w, h] = tree::bbox(obj, RECORD)?;
    if !obj.contains_key("segmentation") {
        let (x2, y2) = (x1 + w, y1 + h);
        obj.insert(
            "segmentation".into(),
            json!([[x1, y1, x1, y2, x2, y2, x2, y1]]),
        );
    }
    obj.insert("area".into(), json!(w * h));
    Ok(())
}

fn fill_from_mask(obj: &mut Object, index: usize, codec: &impl MaskCodec) -> Result<()> {
    let segmentation = obj.get("segmentation").ok_or(CocoError::MixedResults {
        index,
        expected: "segmentation",
    })?;
    let rle = Segmentation::try_from(segmentation)?.to_rle(codec)?;
    obj.insert("area".into(), json!(codec.area(&rle)));
    if !obj.contains_key("bbox") {
        obj.insert("bbox".into(), json!(codec.to_bbox(&rle)));
    }
    Ok(())
}
