/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix};

/// Returns whether the provided square matrix is symmetric, up to a relative tolerance
pub fn is_symmetric<D>(m: &OMatrix<f64, D, D>, tol: f64) -> bool
where
    D: DimName,
    DefaultAllocator: Allocator<D, D>,
{
    let scale = m.amax().max(1.0);
    for i in 1..D::dim() {
        for j in 0..i {
            if (m[(i, j)] - m[(j, i)]).abs() > tol * scale {
                return false;
            }
        }
    }
    true
}

/// Lower triangular factor `L` of a symmetric positive semi definite matrix, such that `L L' = m`.
///
/// Null pivots are tolerated and leave their column at zero, in which case the rest of that column must be null too.
/// Returns None if the matrix is not finite or not positive semi definite.
pub fn psd_factor<D>(m: &OMatrix<f64, D, D>) -> Option<OMatrix<f64, D, D>>
where
    D: DimName,
    DefaultAllocator: Allocator<D, D>,
{
    if !m.iter().all(|v| v.is_finite()) {
        return None;
    }

    let dim = D::dim();
    let scale = m.amax().max(f64::MIN_POSITIVE);
    let mut factor = OMatrix::<f64, D, D>::zeros();

    for j in 0..dim {
        let pivot = m[(j, j)] - (0..j).map(|p| factor[(j, p)].powi(2)).sum::<f64>();
        if pivot < -1e-12 * scale {
            return None;
        }

        if pivot <= 1e-14 * scale {
            // No variance left along this direction, so no correlation either
            for i in (j + 1)..dim {
                let dot = (0..j).map(|p| factor[(i, p)] * factor[(j, p)]).sum::<f64>();
                if (m[(i, j)] - dot).abs() > 1e-12 * scale {
                    return None;
                }
            }
            continue;
        }

        let l_jj = pivot.sqrt();
        factor[(j, j)] = l_jj;
        for i in (j + 1)..dim {
            let dot = (0..j).map(|p| factor[(i, p)] * factor[(j, p)]).sum::<f64>();
            factor[(i, j)] = (m[(i, j)] - dot) / l_jj;
        }
    }

    Some(factor)
}
