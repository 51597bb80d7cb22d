use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

mod convert;
mod mask;

use convert::{annotation_to_py, category_to_py, image_to_py, to_py_err, value_to_py};

fn to_py_list<T>(
    py: Python<'_>,
    items: &[&T],
    f: impl Fn(Python<'_>, &T) -> PyResult<PyObject>,
) -> PyResult<PyObject> {
    let objs = items
        .iter()
        .map(|item| f(py, item))
        .collect::<PyResult<Vec<_>>>()?;
    Ok(PyList::new(py, objs)?.into_any().unbind())
}

// ---------------------------------------------------------------------------
// COCO
// ---------------------------------------------------------------------------

#[pyclass(name = "COCO")]
#[derive(Clone)]
struct PyCOCO {
    inner: coco_core::COCO,
}

#[pymethods]
impl PyCOCO {
    #[new]
    #[pyo3(signature = (annotation_file=None))]
    fn new(annotation_file: Option<&str>) -> PyResult<Self> {
        let inner = match annotation_file {
            Some(path) => coco_core::COCO::new(Path::new(path)).map_err(to_py_err)?,
            None => coco_core::COCO::default(),
        };
        Ok(PyCOCO { inner })
    }

    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![], area_rng=None, iscrowd=None))]
    fn get_ann_ids(
        &self,
        img_ids: Vec<u64>,
        cat_ids: Vec<u64>,
        area_rng: Option<[f64; 2]>,
        iscrowd: Option<bool>,
    ) -> Vec<u64> {
        self.inner.get_ann_ids(&img_ids, &cat_ids, area_rng, iscrowd)
    }

    #[pyo3(signature = (cat_nms=vec![], sup_nms=vec![], cat_ids=vec![]))]
    fn get_cat_ids(
        &self,
        cat_nms: Vec<String>,
        sup_nms: Vec<String>,
        cat_ids: Vec<u64>,
    ) -> Vec<u64> {
        let cat_nms_ref: Vec<&str> = cat_nms.iter().map(|s| s.as_str()).collect();
        let sup_nms_ref: Vec<&str> = sup_nms.iter().map(|s| s.as_str()).collect();
        self.inner.get_cat_ids(&cat_nms_ref, &sup_nms_ref, &cat_ids)
    }

    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![]))]
    fn get_img_ids(&self, img_ids: Vec<u64>, cat_ids: Vec<u64>) -> Vec<u64> {
        self.inner.get_img_ids(&img_ids, &cat_ids)
    }

    fn load_anns(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        let anns = self.inner.load_anns(&ids).map_err(to_py_err)?;
        to_py_list(py, &anns, annotation_to_py)
    }

    fn load_cats(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        let cats = self.inner.load_cats(&ids).map_err(to_py_err)?;
        to_py_list(py, &cats, category_to_py)
    }

    fn load_imgs(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        let imgs = self.inner.load_imgs(&ids).map_err(to_py_err)?;
        to_py_list(py, &imgs, image_to_py)
    }

    fn load_res(&self, res_file: &str) -> PyResult<PyCOCO> {
        let inner = self
            .inner
            .load_res(Path::new(res_file))
            .map_err(to_py_err)?;
        Ok(PyCOCO { inner })
    }

    // camelCase aliases for pycocotools compatibility
    #[pyo3(name = "getAnnIds")]
    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![], area_rng=None, iscrowd=None))]
    fn get_ann_ids_camel(
        &self,
        img_ids: Vec<u64>,
        cat_ids: Vec<u64>,
        area_rng: Option<[f64; 2]>,
        iscrowd: Option<bool>,
    ) -> Vec<u64> {
        self.get_ann_ids(img_ids, cat_ids, area_rng, iscrowd)
    }

    #[pyo3(name = "getCatIds")]
    #[pyo3(signature = (cat_nms=vec![], sup_nms=vec![], cat_ids=vec![]))]
    fn get_cat_ids_camel(
        &self,
        cat_nms: Vec<String>,
        sup_nms: Vec<String>,
        cat_ids: Vec<u64>,
    ) -> Vec<u64> {
        self.get_cat_ids(cat_nms, sup_nms, cat_ids)
    }

    #[pyo3(name = "getImgIds")]
    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![]))]
    fn get_img_ids_camel(&self, img_ids: Vec<u64>, cat_ids: Vec<u64>) -> Vec<u64> {
        self.get_img_ids(img_ids, cat_ids)
    }

    #[pyo3(name = "loadAnns")]
    fn load_anns_camel(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        self.load_anns(py, ids)
    }

    #[pyo3(name = "loadCats")]
    fn load_cats_camel(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        self.load_cats(py, ids)
    }

    #[pyo3(name = "loadImgs")]
    fn load_imgs_camel(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        self.load_imgs(py, ids)
    }

    #[pyo3(name = "loadRes")]
    fn load_res_camel(&self, res_file: &str) -> PyResult<PyCOCO> {
        self.load_res(res_file)
    }

    fn __copy__(&self) -> Self {
        self.clone()
    }

    fn __deepcopy__(&self, _memo: &Bound<'_, PyAny>) -> Self {
        self.clone()
    }

    #[getter]
    fn dataset(&self, py: Python<'_>) -> PyResult<PyObject> {
        let ds = self.inner.dataset();
        let dict = PyDict::new(py);

        if let Some(info) = &ds.info {
            dict.set_item("info", value_to_py(py, info)?)?;
        }
        if let Some(licenses) = &ds.licenses {
            dict.set_item("licenses", value_to_py(py, licenses)?)?;
        }

        if let Some(images) = &ds.images {
            let images: Vec<&coco_core::Image> = images.iter().collect();
            dict.set_item("images", to_py_list(py, &images, image_to_py)?)?;
        }
        if let Some(annotations) = &ds.annotations {
            let annotations: Vec<&coco_core::Annotation> = annotations.iter().collect();
            dict.set_item("annotations", to_py_list(py, &annotations, annotation_to_py)?)?;
        }
        if let Some(categories) = &ds.categories {
            let categories: Vec<&coco_core::Category> = categories.iter().collect();
            dict.set_item("categories", to_py_list(py, &categories, category_to_py)?)?;
        }

        Ok(dict.into_any().unbind())
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

#[pymodule]
fn pycoco_index(py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCOCO>()?;

    // mask submodule
    let mask_mod = PyModule::new(py, "mask")?;
    mask_mod.add_function(wrap_pyfunction!(mask::encode, &mask_mod)?)?;
    mask_mod.add_function(wrap_pyfunction!(mask::decode, &mask_mod)?)?;
    mask_mod.add_function(wrap_pyfunction!(mask::area, &mask_mod)?)?;
    mask_mod.add_function(wrap_pyfunction!(mask::to_bbox, &mask_mod)?)?;
    mask_mod.add_function(wrap_pyfunction!(mask::rle_to_string, &mask_mod)?)?;
    mask_mod.add_function(wrap_pyfunction!(mask::rle_from_string, &mask_mod)?)?;
    m.add_submodule(&mask_mod)?;

    Ok(())
}
