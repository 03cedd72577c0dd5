//! Small GEMM wrapper used by [`crate::Matrix::multiply`].
//!
//! This module provides a single abstraction over matrix multiplication:
//! - default: a simple, safe triple-loop implementation
//! - optional: a faster backend via the `matrixmultiply` feature
//!
//! `c` is always overwritten (`beta = 0`); its previous contents are never read.

use crate::Scalar;

#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm(
    m: usize,
    n: usize,
    k: usize,
    a: &[Scalar],
    rsa: usize,
    csa: usize,
    b: &[Scalar],
    rsb: usize,
    csb: usize,
    c: &mut [Scalar],
    rsc: usize,
    csc: usize,
) {
    if m == 0 || n == 0 {
        return;
    }

    // Bounds are validated by `Matrix` before reaching this point.

    #[cfg(feature = "matrixmultiply")]
    {
        if k == 0 {
            for i in 0..m {
                for j in 0..n {
                    c[i * rsc + j * csc] = 0.0;
                }
            }
            return;
        }

        // matrixmultiply supports arbitrary strides.
        unsafe {
            matrixmultiply::dgemm(
                m,
                k,
                n,
                1.0,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                0.0,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc: Scalar = 0.0;
            let a0 = i * rsa;
            let b0 = j * csb;

            for p in 0..k {
                let av = a[a0 + p * csa];
                let bv = b[p * rsb + b0];
                acc = av.mul_add(bv, acc);
            }

            c[i * rsc + j * csc] = acc;
        }
    }
}
