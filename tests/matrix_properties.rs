//! Algebraic properties of the strided matrix kernels.

use proptest::prelude::*;

use trace_mlp::{Matrix, Scalar};

const TOL: Scalar = 1e-9;

/// Compact `cols x rows` matrix with small random entries.
fn matrix(cols: usize, rows: usize) -> impl Strategy<Value = Matrix> {
    prop::collection::vec(-10.0..10.0_f64, cols * rows)
        .prop_map(move |v| Matrix::from_row_major(cols, rows, v).unwrap())
}

/// `A (m x k)`, `B (k x n)`, `C (k x n)`.
fn product_operands() -> impl Strategy<Value = (Matrix, Matrix, Matrix)> {
    (1..6_usize, 1..6_usize, 1..6_usize)
        .prop_flat_map(|(m, k, n)| (matrix(k, m), matrix(n, k), matrix(n, k)))
}

proptest! {
    #[test]
    fn multiply_has_expected_shape((a, b, _c) in product_operands()) {
        let mut out = Matrix::new(b.cols(), a.rows());
        out.multiply(&a, &b);
        prop_assert_eq!(out.rows(), a.rows());
        prop_assert_eq!(out.cols(), b.cols());
    }

    #[test]
    fn multiply_distributes_over_add((a, b, c) in product_operands()) {
        let (m, n) = (a.rows(), b.cols());

        let mut b_plus_c = Matrix::new(n, b.rows());
        b_plus_c.add(&b, &c);
        let mut lhs = Matrix::new(n, m);
        lhs.multiply(&a, &b_plus_c);

        let mut ab = Matrix::new(n, m);
        ab.multiply(&a, &b);
        let mut ac = Matrix::new(n, m);
        ac.multiply(&a, &c);
        let mut rhs = Matrix::new(n, m);
        rhs.add(&ab, &ac);

        for (l, r) in lhs.iter().zip(rhs.iter()) {
            let scale = l.abs().max(r.abs()).max(1.0);
            prop_assert!((l - r).abs() <= TOL * scale, "lhs={} rhs={}", l, r);
        }
    }

    #[test]
    fn single_inner_dim_is_outer_product(
        col in prop::collection::vec(-5.0..5.0_f64, 1..6),
        row in prop::collection::vec(-5.0..5.0_f64, 1..6),
    ) {
        let (m, n) = (col.len(), row.len());
        let a = Matrix::from_row_major(1, m, col.clone()).unwrap();
        let b = Matrix::from_row_major(n, 1, row.clone()).unwrap();
        let mut out = Matrix::new(n, m);
        out.multiply(&a, &b);

        for i in 0..m {
            for j in 0..n {
                prop_assert_eq!(out.get(j, i), col[i] * row[j]);
            }
        }
    }

    #[test]
    fn fill_sets_every_cell_and_spares_padding(
        cols in 1..6_usize,
        rows in 1..6_usize,
        pad in 0..4_usize,
        value in -100.0..100.0_f64,
    ) {
        let stride = cols + pad;
        let sentinel = -12345.0;
        let mut buf = vec![sentinel; stride * rows];

        {
            let mut m = Matrix::from_buffer(&mut buf[..], cols, rows, stride);
            m.fill(value);
            for r in 0..rows {
                for c in 0..cols {
                    prop_assert_eq!(m.get(c, r), value);
                }
            }
        }

        for r in 0..rows {
            for p in cols..stride {
                prop_assert_eq!(buf[r * stride + p], sentinel);
            }
        }
    }

    #[test]
    fn strided_views_multiply_like_compact_copies(
        (a, b, _c) in product_operands(),
        pad in 0..3_usize,
    ) {
        // Re-lay `a` with padding after every row.
        let stride = a.cols() + pad;
        let mut buf = vec![0.0; stride * a.rows()];
        for r in 0..a.rows() {
            buf[r * stride..r * stride + a.cols()].copy_from_slice(a.row(r));
        }
        let strided = Matrix::from_buffer(&buf[..], a.cols(), a.rows(), stride);

        let mut expected = Matrix::new(b.cols(), a.rows());
        expected.multiply(&a, &b);
        let mut actual = Matrix::new(b.cols(), a.rows());
        actual.multiply(&strided, &b);

        prop_assert_eq!(actual, expected);
    }
}
