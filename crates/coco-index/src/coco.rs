//! COCO dataset loading, indexing and querying.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;
use std::time::Instant;

use serde_json::Value;

use crate::error::{CocoError, RecordKind, Result};
use crate::types::{Annotation, Category, Dataset, Image};

/// An indexed, read-only view over one dataset.
///
/// The store owns its [`Dataset`]; every index holds ids or positions into
/// the dataset's sections, never references, so `clone` is a deep copy.
///
/// The dataset is only reachable through [`COCO::dataset`] once indexed. To
/// edit it, take it back with [`COCO::into_dataset`] and rebuild:
///
/// ```compile_fail
/// let mut coco = coco_index::COCO::default();
/// coco.dataset.annotations = None;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct COCO {
    dataset: Dataset,
    /// ann_id -> position in dataset.annotations (last occurrence wins)
    anns: HashMap<u64, usize>,
    /// img_id -> position in dataset.images
    imgs: HashMap<u64, usize>,
    /// cat_id -> position in dataset.categories
    cats: HashMap<u64, usize>,
    /// img_id -> [position in dataset.annotations, ...] in document order
    img_to_anns: HashMap<u64, Vec<usize>>,
    /// cat_id -> [img_id, ...], one entry per annotation
    cat_to_imgs: HashMap<u64, Vec<u64>>,
}

impl COCO {
    /// Load a COCO annotation JSON file and build indices.
    pub fn new(annotation_file: &Path) -> Result<Self> {
        log::info!("loading annotations into memory...");
        let start = Instant::now();
        let file =
            File::open(annotation_file).map_err(|e| CocoError::from(e).in_file(annotation_file))?;
        let coco =
            Self::from_reader(BufReader::new(file)).map_err(|e| e.in_file(annotation_file))?;
        log::info!("Done (t={:.2}s)", start.elapsed().as_secs_f64());
        Ok(coco)
    }

    /// Parse a COCO JSON document from `reader` and build indices.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let tree: Value = serde_json::from_reader(reader)?;
        Self::from_tree(&tree)
    }

    /// Build a store from an already-parsed document tree.
    pub fn from_tree(tree: &Value) -> Result<Self> {
        Ok(Self::from_dataset(Dataset::from_tree(tree)?))
    }

    /// Build a COCO object from an already-loaded Dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut coco = COCO {
            dataset,
            ..Default::default()
        };
        coco.create_index();
        coco
    }

    /// The indexed dataset.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Give up the indices and return the owned dataset.
    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    /// Build internal index structures from the dataset.
    fn create_index(&mut self) {
        log::info!("creating index...");
        self.anns.clear();
        self.imgs.clear();
        self.cats.clear();
        self.img_to_anns.clear();
        self.cat_to_imgs.clear();

        if let Some(annotations) = &self.dataset.annotations {
            for (i, ann) in annotations.iter().enumerate() {
                self.anns.insert(ann.id, i);
                self.img_to_anns.entry(ann.image_id).or_default().push(i);
            }
        }

        if let Some(images) = &self.dataset.images {
            for (i, img) in images.iter().enumerate() {
                self.imgs.insert(img.id, i);
            }
        }

        if let Some(categories) = &self.dataset.categories {
            for (i, cat) in categories.iter().enumerate() {
                self.cats.insert(cat.id, i);
            }
        }

        if let (Some(_), Some(annotations)) = (&self.dataset.categories, &self.dataset.annotations) {
            for ann in annotations {
                self.cat_to_imgs
                    .entry(ann.category_id)
                    .or_default()
                    .push(ann.image_id);
            }
        }

        log::info!(
            "index created! ({} annotations, {} images, {} categories)",
            self.anns.len(),
            self.imgs.len(),
            self.cats.len()
        );
    }

    /// Get annotation IDs matching the given filters.
    ///
    /// Candidates are the annotations of `img_ids` in the order listed (or every
    /// annotation in document order when `img_ids` is empty). They are then
    /// narrowed by category, by the open area interval `(lo, hi)`, and by crowd
    /// flag, in that order. Empty slices / `None` skip a filter. The result
    /// keeps candidate order and is not sorted or deduplicated.
    pub fn get_ann_ids(
        &self,
        img_ids: &[u64],
        cat_ids: &[u64],
        area_rng: Option<[f64; 2]>,
        is_crowd: Option<bool>,
    ) -> Vec<u64> {
        let annotations = self.dataset.annotations();
        let mut candidates: Vec<&Annotation> = if img_ids.is_empty() {
            annotations.iter().collect()
        } else {
            img_ids
                .iter()
                .filter_map(|id| self.img_to_anns.get(id))
                .flatten()
                .map(|&i| &annotations[i])
                .collect()
        };

        if !cat_ids.is_empty() {
            candidates = candidates
                .into_iter()
                .filter(|ann| cat_ids.contains(&ann.category_id))
                .collect();
        }

        if let Some([lo, hi]) = area_rng {
            candidates = candidates
                .into_iter()
                .filter(|ann| lo < ann.area && ann.area < hi)
                .collect();
        }

        candidates
            .into_iter()
            .filter(|ann| is_crowd.map_or(true, |crowd| ann.iscrowd == crowd))
            .map(|ann| ann.id)
            .collect()
    }

    /// Get category IDs matching the given filters, in document order.
    pub fn get_cat_ids(&self, cat_nms: &[&str], sup_nms: &[&str], cat_ids: &[u64]) -> Vec<u64> {
        let mut cats: Vec<&Category> = self.dataset.categories().iter().collect();

        if !cat_nms.is_empty() {
            cats.retain(|cat| cat_nms.contains(&cat.name.as_str()));
        }
        if !sup_nms.is_empty() {
            cats.retain(|cat| sup_nms.contains(&cat.supercategory.as_str()));
        }
        if !cat_ids.is_empty() {
            cats.retain(|cat| cat_ids.contains(&cat.id));
        }

        cats.into_iter().map(|cat| cat.id).collect()
    }

    /// Get image IDs matching the given filters.
    ///
    /// Starts from `img_ids` (or every image in document order) and, when
    /// `cat_ids` is non-empty, keeps images holding at least one annotation of
    /// a listed category. Each id appears once, at its first position.
    pub fn get_img_ids(&self, img_ids: &[u64], cat_ids: &[u64]) -> Vec<u64> {
        let mut ids: Vec<u64> = if !img_ids.is_empty() {
            img_ids.to_vec()
        } else {
            self.dataset.images().iter().map(|img| img.id).collect()
        };

        if !cat_ids.is_empty() {
            let valid: HashSet<u64> = cat_ids
                .iter()
                .filter_map(|cid| self.cat_to_imgs.get(cid))
                .flatten()
                .copied()
                .collect();
            ids.retain(|id| valid.contains(id));
        }

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));
        ids
    }

    /// Load annotations by IDs; an unknown id is an error.
    pub fn load_anns(&self, ids: &[u64]) -> Result<Vec<&Annotation>> {
        ids.iter()
            .map(|&id| {
                self.get_ann(id).ok_or(CocoError::MissingId {
                    kind: RecordKind::Annotation,
                    id,
                })
            })
            .collect()
    }

    /// Load categories by IDs; an unknown id is an error.
    pub fn load_cats(&self, ids: &[u64]) -> Result<Vec<&Category>> {
        ids.iter()
            .map(|&id| {
                self.get_cat(id).ok_or(CocoError::MissingId {
                    kind: RecordKind::Category,
                    id,
                })
            })
            .collect()
    }

    /// Load images by IDs; an unknown id is an error.
    pub fn load_imgs(&self, ids: &[u64]) -> Result<Vec<&Image>> {
        ids.iter()
            .map(|&id| {
                self.get_img(id).ok_or(CocoError::MissingId {
                    kind: RecordKind::Image,
                    id,
                })
            })
            .collect()
    }

    /// Get a single annotation by ID.
    pub fn get_ann(&self, id: u64) -> Option<&Annotation> {
        self.anns.get(&id).map(|&i| &self.dataset.annotations()[i])
    }

    /// Get a single image by ID.
    pub fn get_img(&self, id: u64) -> Option<&Image> {
        self.imgs.get(&id).map(|&i| &self.dataset.images()[i])
    }

    /// Get a single category by ID.
    pub fn get_cat(&self, id: u64) -> Option<&Category> {
        self.cats.get(&id).map(|&i| &self.dataset.categories()[i])
    }

    /// Annotations of one image, in document order.
    pub fn anns_for_img(&self, img_id: u64) -> impl Iterator<Item = &Annotation> + '_ {
        let annotations = self.dataset.annotations();
        self.img_to_anns
            .get(&img_id)
            .into_iter()
            .flatten()
            .map(move |&i| &annotations[i])
    }

    /// Image ids of every annotation in a category (one per annotation).
    pub fn imgs_for_cat(&self, cat_id: u64) -> &[u64] {
        self.cat_to_imgs
            .get(&cat_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Serialize the owned dataset back into a document tree.
    pub fn to_tree(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.dataset)?)
    }

    /// Write the owned dataset as JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| CocoError::from(e).in_file(path))?;
        serde_json::to_writer(BufWriter::new(file), &self.dataset)
            .map_err(|e| CocoError::from(e).in_file(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segmentation;
    use serde_json::json;

    fn make_test_tree() -> Value {
        json!({
            "images": [
                {"id": 1, "file_name": "img1.jpg", "height": 100, "width": 100},
                {"id": 2, "file_name": "img2.jpg", "height": 200, "width": 200},
                {"id": 3, "file_name": "img3.jpg", "height": 50, "width": 50}
            ],
            "annotations": [
                {"id": 5, "image_id": 1, "category_id": 1, "bbox": [10, 10, 20, 20],
                 "area": 400.0, "iscrowd": 0, "segmentation": [[10, 10, 30, 10, 30, 30]]},
                {"id": 2, "image_id": 2, "category_id": 1, "bbox": [0, 0, 50, 50],
                 "area": 2500.0, "iscrowd": 1,
                 "segmentation": {"size": [200, 200], "counts": [0, 2500, 37500]}},
                {"id": 9, "image_id": 1, "category_id": 2, "bbox": [30, 30, 10, 10],
                 "area": 100.0, "iscrowd": 0, "segmentation": [[30, 30, 40, 30, 40, 40]]},
                {"id": 4, "image_id": 2, "category_id": 2, "bbox": [5, 5, 10, 30],
                 "area": 300.0, "iscrowd": 0,
                 "segmentation": {"size": [200, 200], "counts": "0Z1"}}
            ],
            "categories": [
                {"id": 2, "name": "dog", "supercategory": "animal"},
                {"id": 1, "name": "cat", "supercategory": "animal"},
                {"id": 3, "name": "car", "supercategory": "vehicle"}
            ]
        })
    }

    fn make_test_coco() -> COCO {
        COCO::from_tree(&make_test_tree()).unwrap()
    }

    #[test]
    fn test_create_index() {
        let coco = make_test_coco();
        assert_eq!(coco.anns.len(), 4);
        assert_eq!(coco.imgs.len(), 3);
        assert_eq!(coco.cats.len(), 3);
        assert_eq!(coco.img_to_anns[&1], vec![0, 2]);
        assert_eq!(coco.img_to_anns[&2], vec![1, 3]);
        assert!(!coco.img_to_anns.contains_key(&3));
    }

    #[test]
    fn test_img_to_anns_partitions_annotations() {
        let coco = make_test_coco();
        let mut seen = 0;
        for (img_id, positions) in &coco.img_to_anns {
            for &i in positions {
                assert_eq!(coco.dataset.annotations()[i].image_id, *img_id);
            }
            seen += positions.len();
        }
        assert_eq!(seen, coco.dataset.annotations().len());
    }

    #[test]
    fn test_cat_to_imgs_keeps_one_entry_per_annotation() {
        let tree = json!({
            "annotations": [
                {"id": 1, "image_id": 7, "category_id": 1, "bbox": [0, 0, 1, 1],
                 "area": 1.0, "iscrowd": 0, "segmentation": []},
                {"id": 2, "image_id": 7, "category_id": 1, "bbox": [0, 0, 1, 1],
                 "area": 1.0, "iscrowd": 0, "segmentation": []},
                {"id": 3, "image_id": 3, "category_id": 1, "bbox": [0, 0, 1, 1],
                 "area": 1.0, "iscrowd": 0, "segmentation": []}
            ],
            "categories": [{"id": 1, "name": "cat", "supercategory": "animal"}]
        });
        let coco = COCO::from_tree(&tree).unwrap();
        assert_eq!(coco.imgs_for_cat(1), &[7, 7, 3]);
        assert!(coco.imgs_for_cat(2).is_empty());
    }

    #[test]
    fn test_cat_to_imgs_needs_categories_section() {
        let mut tree = make_test_tree();
        tree.as_object_mut().unwrap().remove("categories");
        let coco = COCO::from_tree(&tree).unwrap();
        assert!(coco.cat_to_imgs.is_empty());
        assert_eq!(coco.anns.len(), 4);
    }

    #[test]
    fn test_partial_dataset() {
        let coco = COCO::from_tree(&json!({
            "categories": [{"id": 1, "name": "cat", "supercategory": "animal"}]
        }))
        .unwrap();
        assert_eq!(coco.get_cat_ids(&[], &[], &[]), vec![1]);
        assert!(coco.get_ann_ids(&[], &[], None, None).is_empty());
        assert!(coco.dataset.annotations.is_none());
    }

    #[test]
    fn test_rejects_malformed_documents() {
        assert!(matches!(
            COCO::from_tree(&json!([1, 2])),
            Err(CocoError::WrongType { field: "<root>", .. })
        ));
        assert!(matches!(
            COCO::from_tree(&json!({"annotations": {}})),
            Err(CocoError::WrongType { field: "annotations", .. })
        ));
        assert!(matches!(
            COCO::from_tree(&json!({"images": [{"id": 1, "width": 3, "height": 3}]})),
            Err(CocoError::MissingField { field: "file_name", .. })
        ));
    }

    #[test]
    fn test_get_ann_ids_all_in_document_order() {
        let coco = make_test_coco();
        assert_eq!(coco.get_ann_ids(&[], &[], None, None), vec![5, 2, 9, 4]);
    }

    #[test]
    fn test_get_ann_ids_by_img() {
        let coco = make_test_coco();
        assert_eq!(coco.get_ann_ids(&[1], &[], None, None), vec![5, 9]);
        assert_eq!(coco.get_ann_ids(&[2, 1], &[], None, None), vec![2, 4, 5, 9]);
        // unknown and annotation-less images contribute nothing
        assert_eq!(coco.get_ann_ids(&[42, 3, 1], &[], None, None), vec![5, 9]);
    }

    #[test]
    fn test_get_ann_ids_by_cat() {
        let coco = make_test_coco();
        assert_eq!(coco.get_ann_ids(&[], &[1], None, None), vec![5, 2]);
        assert_eq!(coco.get_ann_ids(&[2], &[2], None, None), vec![4]);
    }

    #[test]
    fn test_get_ann_ids_area_is_open_interval() {
        let coco = make_test_coco();
        assert_eq!(coco.get_ann_ids(&[], &[], Some([100.0, 2500.0]), None), vec![5, 4]);
        assert_eq!(coco.get_ann_ids(&[], &[], Some([99.0, 2501.0]), None), vec![5, 2, 9, 4]);
        assert!(coco.get_ann_ids(&[], &[], Some([400.0, 400.0]), None).is_empty());
    }

    #[test]
    fn test_get_ann_ids_by_crowd() {
        let coco = make_test_coco();
        assert_eq!(coco.get_ann_ids(&[], &[], None, None).len(), 4);
        assert_eq!(coco.get_ann_ids(&[], &[], None, Some(true)), vec![2]);
        assert_eq!(coco.get_ann_ids(&[], &[], None, Some(false)), vec![5, 9, 4]);
        assert_eq!(coco.get_ann_ids(&[1], &[], None, Some(true)), Vec::<u64>::new());
    }

    #[test]
    fn test_get_ann_ids_filters_compose() {
        let coco = make_test_coco();
        let ids = coco.get_ann_ids(&[2, 1], &[2], Some([50.0, 1000.0]), Some(false));
        assert_eq!(ids, vec![4, 9]);
    }

    #[test]
    fn test_get_cat_ids() {
        let coco = make_test_coco();
        assert_eq!(coco.get_cat_ids(&[], &[], &[]), vec![2, 1, 3]);
        assert_eq!(coco.get_cat_ids(&["cat"], &[], &[]), vec![1]);
        assert_eq!(coco.get_cat_ids(&[], &["animal"], &[]), vec![2, 1]);
        assert_eq!(coco.get_cat_ids(&["cat", "car"], &["animal"], &[]), vec![1]);
        assert_eq!(coco.get_cat_ids(&[], &["animal"], &[3, 2]), vec![2]);
        assert!(coco.get_cat_ids(&["horse"], &[], &[]).is_empty());
    }

    #[test]
    fn test_get_img_ids() {
        let coco = make_test_coco();
        assert_eq!(coco.get_img_ids(&[], &[]), vec![1, 2, 3]);
        assert_eq!(coco.get_img_ids(&[], &[1]), vec![1, 2]);
        assert_eq!(coco.get_img_ids(&[3, 2, 2], &[]), vec![3, 2]);
        assert_eq!(coco.get_img_ids(&[3, 2], &[2]), vec![2]);
        assert!(coco.get_img_ids(&[], &[3]).is_empty());
    }

    #[test]
    fn test_load_anns() {
        let coco = make_test_coco();
        let anns = coco.load_anns(&[9, 5]).unwrap();
        assert_eq!(anns[0].category_id, 2);
        assert_eq!(anns[1].bbox, [10.0, 10.0, 20.0, 20.0]);
        assert!(matches!(
            anns[0].segmentation,
            Segmentation::Polygon(_)
        ));
        assert!(matches!(
            coco.get_ann(4).unwrap().segmentation,
            Segmentation::CompressedRle { .. }
        ));
    }

    #[test]
    fn test_load_missing_ids_is_an_error() {
        let coco = make_test_coco();
        assert!(matches!(
            coco.load_anns(&[5, 77]),
            Err(CocoError::MissingId {
                kind: RecordKind::Annotation,
                id: 77
            })
        ));
        assert!(matches!(
            coco.load_imgs(&[0]),
            Err(CocoError::MissingId {
                kind: RecordKind::Image,
                id: 0
            })
        ));
        assert!(matches!(
            coco.load_cats(&[1, 4]),
            Err(CocoError::MissingId {
                kind: RecordKind::Category,
                id: 4
            })
        ));
        assert_eq!(coco.load_imgs(&[3]).unwrap()[0].file_name, "img3.jpg");
    }

    #[test]
    fn test_duplicate_ids_last_write_wins() {
        let tree = json!({
            "annotations": [
                {"id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 1, 1],
                 "area": 1.0, "iscrowd": 0, "segmentation": []},
                {"id": 1, "image_id": 2, "category_id": 1, "bbox": [0, 0, 2, 2],
                 "area": 4.0, "iscrowd": 0, "segmentation": []}
            ]
        });
        let coco = COCO::from_tree(&tree).unwrap();
        assert_eq!(coco.get_ann(1).unwrap().area, 4.0);
        assert_eq!(coco.get_ann_ids(&[], &[], None, None), vec![1, 1]);
        // each image index keeps its own record
        assert_eq!(coco.anns_for_img(1).next().unwrap().area, 1.0);
    }

    #[test]
    fn test_rebuilding_index_is_deterministic() {
        let a = make_test_coco();
        let b = make_test_coco();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.create_index();
        assert_eq!(a, c);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = make_test_coco();
        let mut copy = original.clone();
        drop(original);
        assert_eq!(copy.get_ann_ids(&[1], &[], None, None), vec![5, 9]);

        copy.dataset.annotations = Some(Vec::new());
        copy.create_index();
        assert!(copy.get_ann_ids(&[], &[], None, None).is_empty());
        assert_eq!(make_test_coco().get_ann_ids(&[], &[], None, None).len(), 4);
    }

    #[test]
    fn test_edit_goes_through_rebuild() {
        let coco = make_test_coco();
        assert_eq!(coco.dataset().annotations().len(), 4);

        let mut dataset = coco.into_dataset();
        if let Some(annotations) = dataset.annotations.as_mut() {
            annotations.retain(|ann| ann.id != 9);
        }
        let coco = COCO::from_dataset(dataset);
        assert_eq!(coco.get_ann_ids(&[1], &[], None, None), vec![5]);
        assert!(coco.get_ann(9).is_none());
        assert!(coco.load_anns(&[9]).is_err());
        assert_eq!(coco.load_anns(&[5]).unwrap()[0].id, 5);
    }

    #[test]
    fn test_to_tree_roundtrip() {
        let coco = make_test_coco();
        let rebuilt = COCO::from_tree(&coco.to_tree().unwrap()).unwrap();
        assert_eq!(coco, rebuilt);
    }
}
