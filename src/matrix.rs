//! Strided 2-D matrices.
//!
//! A [`Matrix`] is a `(cols, rows, stride)` descriptor over some storage `S`.
//! Logical element `(col, row)` lives at `data[row * stride + col]`; the
//! `stride - cols` trailing elements of each row are padding that no operation
//! reads or writes.
//!
//! The storage parameter decides ownership:
//! - `Matrix` (`Matrix<Vec<Scalar>>`) owns a zero-initialised buffer (`stride == cols`)
//! - [`MatrixView`] / [`MatrixViewMut`] borrow caller-supplied storage, which is how
//!   the network carves its packed arena and how a batch buffer exposes one
//!   sample row without copying.
//!
//! Shape mismatches in the arithmetic kernels are programmer error and panic.

use std::fmt;

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::matmul::gemm;
use crate::{Error, Result, Scalar};

#[derive(Debug, Clone)]
pub struct Matrix<S = Vec<Scalar>> {
    cols: usize,
    rows: usize,
    stride: usize,
    data: S,
}

/// Read-only matrix over borrowed storage.
pub type MatrixView<'a> = Matrix<&'a [Scalar]>;

/// Mutable matrix over borrowed storage.
pub type MatrixViewMut<'a> = Matrix<&'a mut [Scalar]>;

/// Minimum number of elements a buffer must hold to back a `cols x rows` matrix.
#[inline]
pub(crate) fn required_len(cols: usize, rows: usize, stride: usize) -> usize {
    if cols == 0 || rows == 0 {
        0
    } else {
        stride * (rows - 1) + cols
    }
}

impl Matrix<Vec<Scalar>> {
    /// Allocate a zero-filled `cols x rows` matrix.
    pub fn new(cols: usize, rows: usize) -> Self {
        let len = cols
            .checked_mul(rows)
            .expect("matrix element count overflows usize");
        Self {
            cols,
            rows,
            stride: cols,
            data: vec![0.0; len],
        }
    }

    /// Take ownership of a row-major buffer of exactly `cols * rows` elements.
    pub fn from_row_major(cols: usize, rows: usize, data: Vec<Scalar>) -> Result<Self> {
        let expected = cols
            .checked_mul(rows)
            .ok_or_else(|| Error::InvalidShape("matrix shape overflow".to_owned()))?;
        if data.len() != expected {
            return Err(Error::InvalidShape(format!(
                "buffer length {} does not match cols * rows ({cols} * {rows})",
                data.len()
            )));
        }
        Ok(Self {
            cols,
            rows,
            stride: cols,
            data,
        })
    }

    /// Consume the matrix, returning its backing buffer.
    pub fn into_inner(self) -> Vec<Scalar> {
        self.data
    }
}

impl<S> Matrix<S> {
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn same_shape<T>(&self, other: &Matrix<T>) -> bool {
        self.cols == other.cols && self.rows == other.rows
    }

    #[inline]
    fn offset(&self, col: usize, row: usize) -> usize {
        debug_assert!(
            col < self.cols && row < self.rows,
            "({col}, {row}) out of bounds for {}x{} matrix",
            self.cols,
            self.rows
        );
        row * self.stride + col
    }
}

impl<S: AsRef<[Scalar]>> Matrix<S> {
    /// Describe `buffer` as a `cols x rows` matrix whose rows start `stride`
    /// elements apart.
    ///
    /// Contract:
    /// - `stride >= cols`
    /// - `buffer` holds at least `stride * (rows - 1) + cols` elements
    pub fn from_buffer(buffer: S, cols: usize, rows: usize, stride: usize) -> Self {
        assert!(stride >= cols, "stride {stride} must be >= cols {cols}");
        let needed = required_len(cols, rows, stride);
        assert!(
            buffer.as_ref().len() >= needed,
            "buffer len {} too small for {cols}x{rows} matrix with stride {stride} (needs {needed})",
            buffer.as_ref().len()
        );
        Self {
            cols,
            rows,
            stride,
            data: buffer,
        }
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> Scalar {
        self.data.as_ref()[self.offset(col, row)]
    }

    /// The `cols` logical elements of `row`, padding excluded.
    #[inline]
    pub fn row(&self, row: usize) -> &[Scalar] {
        assert!(row < self.rows, "row {row} out of bounds ({})", self.rows);
        let start = row * self.stride;
        &self.data.as_ref()[start..start + self.cols]
    }

    #[inline]
    pub fn as_view(&self) -> MatrixView<'_> {
        Matrix {
            cols: self.cols,
            rows: self.rows,
            stride: self.stride,
            data: self.data.as_ref(),
        }
    }

    /// Logical elements in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.rows).flat_map(move |r| self.row(r).iter().copied())
    }

    /// Copy the logical elements into a row-major `Vec` (padding dropped).
    pub fn to_vec(&self) -> Vec<Scalar> {
        self.iter().collect()
    }

    /// Compact owning copy of this matrix.
    pub fn to_owned_matrix(&self) -> Matrix {
        Matrix {
            cols: self.cols,
            rows: self.rows,
            stride: self.cols,
            data: self.to_vec(),
        }
    }
}

impl<S: AsRef<[Scalar]> + AsMut<[Scalar]>> Matrix<S> {
    #[inline]
    pub fn set(&mut self, col: usize, row: usize, value: Scalar) {
        let idx = self.offset(col, row);
        self.data.as_mut()[idx] = value;
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [Scalar] {
        assert!(row < self.rows, "row {row} out of bounds ({})", self.rows);
        let start = row * self.stride;
        &mut self.data.as_mut()[start..start + self.cols]
    }

    #[inline]
    pub fn as_view_mut(&mut self) -> MatrixViewMut<'_> {
        Matrix {
            cols: self.cols,
            rows: self.rows,
            stride: self.stride,
            data: self.data.as_mut(),
        }
    }

    /// Set every logical cell to `value`. Padding columns are left untouched.
    pub fn fill(&mut self, value: Scalar) {
        for r in 0..self.rows {
            self.row_mut(r).fill(value);
        }
    }

    /// Draw every logical cell independently and uniformly from `[0, 1)`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let dist = Uniform::new(0.0, 1.0);
        for r in 0..self.rows {
            for v in self.row_mut(r) {
                *v = dist.sample(rng);
            }
        }
    }

    /// Apply `f` to every logical cell in place.
    pub fn map_inplace(&mut self, mut f: impl FnMut(Scalar) -> Scalar) {
        for r in 0..self.rows {
            for v in self.row_mut(r) {
                *v = f(*v);
            }
        }
    }

    /// Copy `src` cell by cell (strides may differ).
    pub fn copy_from<A: AsRef<[Scalar]>>(&mut self, src: &Matrix<A>) {
        assert!(
            self.same_shape(src),
            "copy shape mismatch: dst {}x{}, src {}x{}",
            self.cols,
            self.rows,
            src.cols,
            src.rows
        );
        for r in 0..self.rows {
            self.row_mut(r).copy_from_slice(src.row(r));
        }
    }

    /// `self = a + b`, element-wise.
    pub fn add<A, B>(&mut self, a: &Matrix<A>, b: &Matrix<B>)
    where
        A: AsRef<[Scalar]>,
        B: AsRef<[Scalar]>,
    {
        assert!(
            self.same_shape(a) && self.same_shape(b),
            "add shape mismatch: dst {}x{}, a {}x{}, b {}x{}",
            self.cols,
            self.rows,
            a.cols,
            a.rows,
            b.cols,
            b.rows
        );
        for r in 0..self.rows {
            let (ra, rb) = (a.row(r), b.row(r));
            for ((d, &x), &y) in self.row_mut(r).iter_mut().zip(ra).zip(rb) {
                *d = x + y;
            }
        }
    }

    /// `self = self + src`, element-wise.
    ///
    /// This is the in-place form of [`Matrix::add`] for when the destination
    /// is also one of the operands.
    pub fn add_assign<A: AsRef<[Scalar]>>(&mut self, src: &Matrix<A>) {
        assert!(
            self.same_shape(src),
            "add shape mismatch: dst {}x{}, src {}x{}",
            self.cols,
            self.rows,
            src.cols,
            src.rows
        );
        for r in 0..self.rows {
            for (d, &x) in self.row_mut(r).iter_mut().zip(src.row(r)) {
                *d += x;
            }
        }
    }

    /// `self = a . b` (standard matrix product).
    ///
    /// Shape contract:
    /// - `a.cols() == b.rows()`
    /// - `self.rows() == a.rows()`
    /// - `self.cols() == b.cols()`
    ///
    /// Every destination cell is overwritten, so `self` need not be zeroed first.
    pub fn multiply<A, B>(&mut self, a: &Matrix<A>, b: &Matrix<B>)
    where
        A: AsRef<[Scalar]>,
        B: AsRef<[Scalar]>,
    {
        assert_eq!(
            a.cols, b.rows,
            "multiply inner dims differ: a is {}x{}, b is {}x{}",
            a.cols, a.rows, b.cols, b.rows
        );
        assert_eq!(
            self.rows, a.rows,
            "multiply dst rows {} do not match a rows {}",
            self.rows, a.rows
        );
        assert_eq!(
            self.cols, b.cols,
            "multiply dst cols {} do not match b cols {}",
            self.cols, b.cols
        );

        let (m, n, k) = (a.rows, b.cols, a.cols);
        let (rsa, rsb, rsc) = (a.stride, b.stride, self.stride);
        gemm(
            m,
            n,
            k,
            a.data.as_ref(),
            rsa,
            1,
            b.data.as_ref(),
            rsb,
            1,
            self.data.as_mut(),
            rsc,
            1,
        );
    }
}

impl<S: AsRef<[Scalar]>, T: AsRef<[Scalar]>> PartialEq<Matrix<T>> for Matrix<S> {
    /// Logical equality: same shape and same cells, regardless of stride.
    fn eq(&self, other: &Matrix<T>) -> bool {
        self.same_shape(other) && (0..self.rows).all(|r| self.row(r) == other.row(r))
    }
}

impl<S: AsRef<[Scalar]>> fmt::Display for Matrix<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for v in self.row(r) {
                write!(f, "\t{v:.6}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
