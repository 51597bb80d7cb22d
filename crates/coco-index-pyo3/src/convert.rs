use coco_core::{Annotation, Category, CocoError, Image, Rle, Segmentation};
use pyo3::exceptions::{PyIOError, PyKeyError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyList, PyString};
use serde_json::Value;

/// Map a library error onto the closest Python exception.
pub fn to_py_err(err: CocoError) -> PyErr {
    match &err {
        CocoError::MissingId { .. } => PyKeyError::new_err(err.to_string()),
        CocoError::Io(_) => PyIOError::new_err(err.to_string()),
        CocoError::File { source, .. } if matches!(**source, CocoError::Io(_)) => {
            PyIOError::new_err(err.to_string())
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

pub fn annotation_to_py(py: Python<'_>, ann: &Annotation) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("id", ann.id)?;
    dict.set_item("image_id", ann.image_id)?;
    dict.set_item("category_id", ann.category_id)?;
    dict.set_item("bbox", ann.bbox.to_vec())?;
    dict.set_item("area", ann.area)?;
    dict.set_item("segmentation", segmentation_to_py(py, &ann.segmentation)?)?;
    dict.set_item("iscrowd", u8::from(ann.iscrowd))?;
    if let Some(score) = ann.score {
        dict.set_item("score", score)?;
    }
    Ok(dict.into_any().unbind())
}

pub fn segmentation_to_py(py: Python<'_>, seg: &Segmentation) -> PyResult<PyObject> {
    match seg {
        Segmentation::Polygon(polys) => {
            let polys = polys
                .iter()
                .map(|p| PyList::new(py, p.iter()))
                .collect::<PyResult<Vec<_>>>()?;
            Ok(PyList::new(py, polys)?.into_any().unbind())
        }
        Segmentation::CompressedRle { size, counts } => {
            let dict = PyDict::new(py);
            dict.set_item("size", size.to_vec())?;
            dict.set_item("counts", counts)?;
            Ok(dict.into_any().unbind())
        }
        Segmentation::UncompressedRle { size, counts } => {
            let dict = PyDict::new(py);
            dict.set_item("size", size.to_vec())?;
            dict.set_item("counts", counts.clone())?;
            Ok(dict.into_any().unbind())
        }
    }
}

pub fn image_to_py(py: Python<'_>, img: &Image) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("id", img.id)?;
    dict.set_item("file_name", &img.file_name)?;
    dict.set_item("height", img.height)?;
    dict.set_item("width", img.width)?;
    Ok(dict.into_any().unbind())
}

pub fn category_to_py(py: Python<'_>, cat: &Category) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("id", cat.id)?;
    dict.set_item("name", &cat.name)?;
    dict.set_item("supercategory", &cat.supercategory)?;
    Ok(dict.into_any().unbind())
}

/// Opaque sections such as `info` and `licenses`.
pub fn value_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Null => py.None(),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any().unbind(),
        Value::Number(n) => match (n.as_u64(), n.as_i64()) {
            (Some(u), _) => u.into_pyobject(py)?.into_any().unbind(),
            (None, Some(i)) => i.into_pyobject(py)?.into_any().unbind(),
            _ => PyFloat::new(py, n.as_f64().unwrap_or(f64::NAN))
                .into_any()
                .unbind(),
        },
        Value::String(s) => PyString::new(py, s).into_any().unbind(),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| value_to_py(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new(py, items)?.into_any().unbind()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key, value_to_py(py, item)?)?;
            }
            dict.into_any().unbind()
        }
    })
}

pub fn rle_to_py(py: Python<'_>, rle: &Rle) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("size", vec![rle.h, rle.w])?;
    dict.set_item("counts", rle.counts.clone())?;
    Ok(dict.into_any().unbind())
}

fn required<'py>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Bound<'py, PyAny>> {
    dict.get_item(key)?
        .ok_or_else(|| PyKeyError::new_err(format!("RLE dict is missing '{}'", key)))
}

/// Accepts `{"size": [h, w], "counts": str | [int]}` and `{"h", "w", "counts": [int]}`.
pub fn py_to_rle(dict: &Bound<'_, PyDict>) -> PyResult<Rle> {
    if let Some(size_obj) = dict.get_item("size")? {
        let size: [u32; 2] = size_obj.extract()?;
        let counts_obj = required(dict, "counts")?;
        if let Ok(s) = counts_obj.extract::<String>() {
            return coco_core::mask::rle_from_string(&s, size[0], size[1]).map_err(to_py_err);
        }
        let counts: Vec<u32> = counts_obj.extract()?;
        return Ok(Rle {
            h: size[0],
            w: size[1],
            counts,
        });
    }
    let h: u32 = required(dict, "h")?.extract()?;
    let w: u32 = required(dict, "w")?.extract()?;
    let counts: Vec<u32> = required(dict, "counts")?.extract()?;
    Ok(Rle { h, w, counts })
}
