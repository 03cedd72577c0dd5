//! Training samples.
//!
//! [`Samples`] keeps inputs and expected outputs interleaved in one row-major
//! buffer: every row is `input_dim` inputs followed by `output_dim` outputs. The
//! inputs and outputs are handed out as strided [`MatrixView`]s over that same
//! buffer, so the batch is never split or copied.

use crate::{Error, Matrix, MatrixView, Result, Scalar};

/// A supervised batch: `len` rows of `(inputs, outputs)`.
#[derive(Debug, Clone)]
pub struct Samples {
    data: Vec<Scalar>,
    len: usize,
    input_dim: usize,
    output_dim: usize,
}

impl Samples {
    /// Build samples from an interleaved buffer with rows of
    /// `input_dim + output_dim` scalars.
    pub fn from_interleaved(
        data: Vec<Scalar>,
        input_dim: usize,
        output_dim: usize,
    ) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if output_dim == 0 {
            return Err(Error::InvalidData("output_dim must be > 0".to_owned()));
        }

        let stride = input_dim + output_dim;
        if data.is_empty() {
            return Err(Error::InvalidData("samples must not be empty".to_owned()));
        }
        if !data.len().is_multiple_of(stride) {
            return Err(Error::InvalidData(format!(
                "sample buffer length {} is not divisible by input_dim + output_dim ({input_dim} + {output_dim})",
                data.len()
            )));
        }

        Ok(Self {
            len: data.len() / stride,
            data,
            input_dim,
            output_dim,
        })
    }

    /// Build samples from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into interleaved storage).
    pub fn from_rows(inputs: &[Vec<Scalar>], outputs: &[Vec<Scalar>]) -> Result<Self> {
        if inputs.len() != outputs.len() {
            return Err(Error::InvalidData(format!(
                "inputs/outputs length mismatch: {} vs {}",
                inputs.len(),
                outputs.len()
            )));
        }
        if inputs.is_empty() {
            return Err(Error::InvalidData("samples must not be empty".to_owned()));
        }

        let input_dim = inputs[0].len();
        let output_dim = outputs[0].len();
        let mut data = Vec::with_capacity(inputs.len() * (input_dim + output_dim));

        for (i, (x, y)) in inputs.iter().zip(outputs).enumerate() {
            if x.len() != input_dim {
                return Err(Error::InvalidData(format!(
                    "input row {i} has len {}, expected {input_dim}",
                    x.len()
                )));
            }
            if y.len() != output_dim {
                return Err(Error::InvalidData(format!(
                    "output row {i} has len {}, expected {output_dim}",
                    y.len()
                )));
            }
            data.extend_from_slice(x);
            data.extend_from_slice(y);
        }

        Self::from_interleaved(data, input_dim, output_dim)
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    #[inline]
    fn stride(&self) -> usize {
        self.input_dim + self.output_dim
    }

    /// `len x input_dim` view of the inputs.
    pub fn inputs(&self) -> MatrixView<'_> {
        Matrix::from_buffer(&self.data[..], self.input_dim, self.len, self.stride())
    }

    /// `len x output_dim` view of the expected outputs.
    pub fn outputs(&self) -> MatrixView<'_> {
        Matrix::from_buffer(
            &self.data[self.input_dim..],
            self.output_dim,
            self.len,
            self.stride(),
        )
    }
}
