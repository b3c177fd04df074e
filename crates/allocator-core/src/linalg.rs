//! Dense vector and matrix helpers over `Decimal`.
//!
//! Matrices are row-major `Vec<Vec<Decimal>>`. All arithmetic uses
//! `rust_decimal::Decimal`. No `f64`.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

/// Pivots smaller than this are treated as zero during elimination.
const PIVOT_EPS: Decimal = dec!(0.000000000000000000000001);

/// Dot product.
pub(crate) fn dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| *x * *y).sum()
}

/// Matrix-vector multiplication.
pub(crate) fn mat_vec(mat: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    mat.iter().map(|row| dot(row, v)).collect()
}

/// Quadratic form w' * M * w.
pub(crate) fn quad_form(w: &[Decimal], mat: &[Vec<Decimal>]) -> Decimal {
    dot(w, &mat_vec(mat, w))
}

/// Square root clamped at zero for non-positive inputs.
pub(crate) fn sqrt(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    val.sqrt().unwrap_or(Decimal::ZERO)
}

/// Largest absolute entry.
pub(crate) fn norm_inf(v: &[Decimal]) -> Decimal {
    v.iter().map(|x| x.abs()).max().unwrap_or(Decimal::ZERO)
}

/// Identity matrix of size n.
pub(crate) fn identity(n: usize) -> Vec<Vec<Decimal>> {
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| if i == j { Decimal::ONE } else { Decimal::ZERO })
                .collect()
        })
        .collect()
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when the matrix is singular to working precision.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve_linear_system(
    mut a: Vec<Vec<Decimal>>,
    mut b: Vec<Decimal>,
) -> Option<Vec<Decimal>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            let val = a[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < PIVOT_EPS {
            return None;
        }

        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot_row = a[col].clone();
        let pivot = pivot_row[col];
        let pivot_rhs = b[col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            if factor.is_zero() {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * pivot_row[k];
            }
            b[row] -= factor * pivot_rhs;
        }
    }

    let mut x = vec![Decimal::ZERO; n];
    for row in (0..n).rev() {
        let tail: Decimal = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_two_by_two() {
        // 2x + y = 5, x + 3y = 10 => x = 1, y = 3
        let a = vec![vec![dec!(2), dec!(1)], vec![dec!(1), dec!(3)]];
        let x = solve_linear_system(a, vec![dec!(5), dec!(10)]).unwrap();
        assert!((x[0] - dec!(1)).abs() < dec!(0.0000000001));
        assert!((x[1] - dec!(3)).abs() < dec!(0.0000000001));
    }

    #[test]
    fn test_solve_requires_pivoting() {
        // Leading zero forces a row swap.
        let a = vec![vec![dec!(0), dec!(1)], vec![dec!(1), dec!(0)]];
        let x = solve_linear_system(a, vec![dec!(4), dec!(7)]).unwrap();
        assert_eq!(x, vec![dec!(7), dec!(4)]);
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let a = vec![vec![dec!(1), dec!(2)], vec![dec!(2), dec!(4)]];
        assert!(solve_linear_system(a, vec![dec!(1), dec!(2)]).is_none());
    }

    #[test]
    fn test_quad_form_and_sqrt() {
        let m = vec![vec![dec!(4), dec!(0)], vec![dec!(0), dec!(9)]];
        let w = vec![dec!(0.5), dec!(0.5)];
        assert_eq!(quad_form(&w, &m), dec!(3.25));
        assert!((sqrt(dec!(0.25)) - dec!(0.5)).abs() < dec!(0.0000000001));
        assert_eq!(sqrt(dec!(-1)), Decimal::ZERO);
    }
}
