use coco_core::mask as rmask;
use numpy::{PyArray2, PyArrayMethods, PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::convert::{py_to_rle, rle_to_py, to_py_err};

#[pyfunction]
#[pyo3(signature = (mask, h, w))]
pub fn encode(py: Python<'_>, mask: PyReadonlyArray2<u8>, h: u32, w: u32) -> PyResult<PyObject> {
    let shape = mask.shape();
    if shape[0] != h as usize || shape[1] != w as usize {
        return Err(pyo3::exceptions::PyValueError::new_err(
            "mask shape must match (h, w)",
        ));
    }
    // numpy is row-major, the codec is column-major
    let mut col_major = vec![0u8; (h as usize) * (w as usize)];
    let mask = mask.as_array();
    for ((y, x), &v) in mask.indexed_iter() {
        col_major[y + h as usize * x] = v;
    }
    let rle = rmask::encode(&col_major, h, w).map_err(to_py_err)?;
    rle_to_py(py, &rle)
}

#[pyfunction]
pub fn decode(py: Python<'_>, rle: &Bound<'_, PyDict>) -> PyResult<Py<PyArray2<u8>>> {
    let rle = py_to_rle(rle)?;
    let col_major = rmask::decode(&rle);
    let h = rle.h as usize;
    let w = rle.w as usize;
    let arr = PyArray2::<u8>::zeros(py, [h, w], false);
    {
        let mut view = arr.readwrite();
        let mut view = view.as_array_mut();
        for x in 0..w {
            for y in 0..h {
                view[[y, x]] = col_major[y + h * x];
            }
        }
    }
    Ok(arr.unbind())
}

#[pyfunction]
pub fn area(rle: &Bound<'_, PyDict>) -> PyResult<u64> {
    let rle = py_to_rle(rle)?;
    Ok(rmask::area(&rle))
}

#[pyfunction]
pub fn to_bbox(rle: &Bound<'_, PyDict>) -> PyResult<Vec<f64>> {
    let rle = py_to_rle(rle)?;
    Ok(rmask::to_bbox(&rle).to_vec())
}

#[pyfunction]
pub fn rle_to_string(rle: &Bound<'_, PyDict>) -> PyResult<String> {
    let rle = py_to_rle(rle)?;
    Ok(rmask::rle_to_string(&rle))
}

#[pyfunction]
pub fn rle_from_string(py: Python<'_>, s: &str, h: u32, w: u32) -> PyResult<PyObject> {
    let rle = rmask::rle_from_string(s, h, w).map_err(to_py_err)?;
    rle_to_py(py, &rle)
}
