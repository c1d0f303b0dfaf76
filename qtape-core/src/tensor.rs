//! Dense result tensors
//!
//! Every execution result, every combined result and every derivative is
//! a row-major `f64` array with an explicit shape. A scalar has shape `[]`.

use crate::{QuantumError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-major real tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Tensor {
    /// Create a tensor, checking that the data fills the shape
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        if numel(&shape) != data.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "shape {:?} needs {} entries, got {}",
                shape,
                numel(&shape),
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Create a scalar
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// Create a 1-d tensor
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Create a zero tensor
    pub fn zeros(shape: Vec<usize>) -> Self {
        let data = vec![0.0; numel(&shape)];
        Self { shape, data }
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the data in row-major order
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Consume into the raw data
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if there are no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// The single value of a one-entry tensor
    pub fn item(&self) -> Option<f64> {
        match self.data.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    /// Same data, different shape
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self> {
        Self::new(shape, self.data)
    }

    /// Flatten into one dimension
    pub fn flatten(self) -> Self {
        Self::vector(self.data)
    }

    /// Apply a function to every entry
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    /// Multiply every entry by a constant
    pub fn scale(&self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    fn check_same_shape(&self, other: &Tensor, context: &str) -> Result<()> {
        if self.shape != other.shape {
            return Err(QuantumError::shape_mismatch(format!(
                "{}: {:?} vs {:?}",
                context, self.shape, other.shape
            )));
        }
        Ok(())
    }

    /// Entry-wise sum
    pub fn add(&self, other: &Tensor) -> Result<Self> {
        self.check_same_shape(other, "add")?;
        Ok(Self {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect(),
        })
    }

    /// Entry-wise product
    pub fn mul(&self, other: &Tensor) -> Result<Self> {
        self.check_same_shape(other, "mul")?;
        Ok(Self {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a * b)
                .collect(),
        })
    }

    /// Σ cᵢ·tᵢ over tensors of one shape
    pub fn linear_combination(coeffs: &[f64], tensors: &[Tensor]) -> Result<Self> {
        if coeffs.len() != tensors.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "{} coefficients for {} tensors",
                coeffs.len(),
                tensors.len()
            )));
        }
        let first = tensors
            .first()
            .ok_or_else(|| QuantumError::shape_mismatch("empty linear combination"))?;
        let mut out = Tensor::zeros(first.shape.clone());
        for (c, t) in coeffs.iter().zip(tensors) {
            out.check_same_shape(t, "linear combination")?;
            for (o, v) in out.data.iter_mut().zip(&t.data) {
                *o += c * v;
            }
        }
        Ok(out)
    }

    /// Stack tensors of one shape along a new leading dimension
    pub fn stack(tensors: &[Tensor]) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| QuantumError::shape_mismatch("cannot stack zero tensors"))?;
        let mut shape = Vec::with_capacity(first.ndim() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(&first.shape);
        let mut data = Vec::with_capacity(first.len() * tensors.len());
        for t in tensors {
            first.check_same_shape(t, "stack")?;
            data.extend_from_slice(&t.data);
        }
        Ok(Self { shape, data })
    }

    /// Stack tensors of one shape along a new trailing dimension
    pub fn stack_trailing(tensors: &[Tensor]) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| QuantumError::shape_mismatch("cannot stack zero tensors"))?;
        for t in tensors {
            first.check_same_shape(t, "stack")?;
        }
        let k = tensors.len();
        let mut shape = first.shape.clone();
        shape.push(k);
        let mut data = vec![0.0; first.len() * k];
        for (j, t) in tensors.iter().enumerate() {
            for (i, v) in t.data.iter().enumerate() {
                data[i * k + j] = *v;
            }
        }
        Ok(Self { shape, data })
    }

    /// Concatenate the flattened data of tensors of any shape
    pub fn concat_flat(tensors: &[Tensor]) -> Self {
        Self::vector(tensors.iter().flat_map(|t| t.data.iter().copied()).collect())
    }

    /// Sub-tensor at index `i` of the leading dimension
    pub fn index_leading(&self, i: usize) -> Result<Self> {
        let (&lead, rest) = self
            .shape
            .split_first()
            .ok_or_else(|| QuantumError::shape_mismatch("cannot index a scalar"))?;
        if i >= lead {
            return Err(QuantumError::shape_mismatch(format!(
                "index {} out of range for leading dimension {}",
                i, lead
            )));
        }
        let size = numel(rest);
        Ok(Self {
            shape: rest.to_vec(),
            data: self.data[i * size..(i + 1) * size].to_vec(),
        })
    }

    /// Split along the leading dimension
    pub fn unstack(&self) -> Result<Vec<Self>> {
        let lead = self
            .shape
            .first()
            .copied()
            .ok_or_else(|| QuantumError::shape_mismatch("cannot unstack a scalar"))?;
        (0..lead).map(|i| self.index_leading(i)).collect()
    }

    /// Contract dimension `axis` (size n) with an `n x cols` row-major matrix
    ///
    /// The contracted dimension is replaced by one of size `cols`.
    pub fn contract_axis(&self, axis: usize, matrix: &[f64], cols: usize) -> Result<Self> {
        let n = *self.shape.get(axis).ok_or_else(|| {
            QuantumError::shape_mismatch(format!("axis {} out of range for {:?}", axis, self.shape))
        })?;
        if matrix.len() != n * cols {
            return Err(QuantumError::shape_mismatch(format!(
                "cannot contract dimension {} with a {}-entry matrix of {} columns",
                n,
                matrix.len(),
                cols
            )));
        }
        let outer = numel(&self.shape[..axis]);
        let inner = numel(&self.shape[axis + 1..]);
        let mut shape = self.shape.clone();
        shape[axis] = cols;
        let mut data = vec![0.0; outer * cols * inner];
        for o in 0..outer {
            for k in 0..n {
                for c in 0..cols {
                    let m = matrix[k * cols + c];
                    if m == 0.0 {
                        continue;
                    }
                    for i in 0..inner {
                        data[(o * cols + c) * inner + i] += m * self.data[(o * n + k) * inner + i];
                    }
                }
            }
        }
        Ok(Self { shape, data })
    }

    /// Split off every dimension after `lead`
    ///
    /// Returns the trailing shape and one tensor of shape `lead` per
    /// trailing index, trailing indices in row-major order.
    pub fn split_trailing(&self, lead: &[usize]) -> Result<(Vec<usize>, Vec<Self>)> {
        if !self.shape.starts_with(lead) {
            return Err(QuantumError::shape_mismatch(format!(
                "shape {:?} does not start with {:?}",
                self.shape, lead
            )));
        }
        let trailing = self.shape[lead.len()..].to_vec();
        let t = numel(&trailing);
        let n = numel(lead);
        let slices = (0..t)
            .map(|tau| Self {
                shape: lead.to_vec(),
                data: (0..n).map(|g| self.data[g * t + tau]).collect(),
            })
            .collect();
        Ok((trailing, slices))
    }

    /// Inverse of [`Tensor::split_trailing`]
    pub fn join_trailing(slices: &[Tensor], trailing: &[usize]) -> Result<Self> {
        let stacked = Self::stack_trailing(slices)?;
        let mut shape = slices[0].shape.clone();
        shape.extend_from_slice(trailing);
        stacked.reshape(shape)
    }

    /// Compare entry-wise with relative and absolute tolerances
    pub fn allclose(&self, other: &Tensor, rtol: f64, atol: f64) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= atol + rtol * b.abs())
    }
}

impl From<f64> for Tensor {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item() {
            Some(v) if self.shape.is_empty() => write!(f, "{}", v),
            _ => write!(f, "Tensor{:?}{:?}", self.shape, self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_checks_size() {
        assert!(Tensor::new(vec![2, 2], vec![0.0; 3]).is_err());
        assert!(Tensor::new(vec![], vec![1.0]).is_ok());
    }

    #[test]
    fn test_stack_leading_and_trailing() {
        let a = Tensor::vector(vec![1.0, 2.0]);
        let b = Tensor::vector(vec![3.0, 4.0]);

        let lead = Tensor::stack(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(lead.shape(), &[2, 2]);
        assert_eq!(lead.data(), &[1.0, 2.0, 3.0, 4.0]);

        let trail = Tensor::stack_trailing(&[a, b]).unwrap();
        assert_eq!(trail.shape(), &[2, 2]);
        assert_eq!(trail.data(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_stack_rejects_mismatched_shapes() {
        let a = Tensor::vector(vec![1.0, 2.0]);
        let b = Tensor::scalar(1.0);
        assert!(matches!(
            Tensor::stack(&[a, b]),
            Err(QuantumError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_linear_combination() {
        let a = Tensor::vector(vec![1.0, 0.0]);
        let b = Tensor::vector(vec![0.0, 1.0]);
        let c = Tensor::linear_combination(&[0.5, -2.0], &[a, b]).unwrap();
        assert_eq!(c.data(), &[0.5, -2.0]);
    }

    #[test]
    fn test_contract_axis() {
        // [2, 3] contracted on axis 1 with a 3x1 column of ones sums rows
        let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let r = t.contract_axis(1, &[1.0, 1.0, 1.0], 1).unwrap();
        assert_eq!(r.shape(), &[2, 1]);
        assert_eq!(r.data(), &[6.0, 15.0]);

        let r0 = t.contract_axis(0, &[1.0, -1.0], 1).unwrap();
        assert_eq!(r0.shape(), &[1, 3]);
        assert_eq!(r0.data(), &[-3.0, -3.0, -3.0]);
    }

    #[test]
    fn test_unstack_inverts_stack() {
        let a = Tensor::new(vec![2], vec![0.1, 0.2]).unwrap();
        let b = Tensor::new(vec![2], vec![0.3, 0.4]).unwrap();
        let s = Tensor::stack(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(s.unstack().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_split_trailing() {
        // [2, 3, 2]: lead [2], trailing [3, 2]
        let t = Tensor::new(vec![2, 3, 2], (0..12).map(f64::from).collect()).unwrap();
        let (trailing, slices) = t.split_trailing(&[2]).unwrap();
        assert_eq!(trailing, vec![3, 2]);
        assert_eq!(slices.len(), 6);
        assert_eq!(slices[1].data(), &[1.0, 7.0]);
        assert_eq!(Tensor::join_trailing(&slices, &trailing).unwrap(), t);
        assert!(t.split_trailing(&[3]).is_err());
    }

    #[test]
    fn test_allclose() {
        let a = Tensor::scalar(1.0);
        let b = Tensor::scalar(1.0 + 1e-10);
        assert!(a.allclose(&b, 1e-7, 1e-9));
        assert!(!a.allclose(&Tensor::vector(vec![1.0]), 1e-7, 1e-9));
        assert_relative_eq!(b.item().unwrap(), 1.0, epsilon = 1e-9);
    }
}
