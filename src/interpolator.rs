use ndarray::ArrayView3;

use crate::enums::Interpolation;
use crate::volume::Sample;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Value at an integer index, or `None` outside the volume.
    #[inline]
    fn fetch<T: Sample>(volume: &ArrayView3<'_, T>, x: i64, y: i64, z: i64) -> Option<T> {
        let (dx, dy, dz) = volume.dim();
        if x < 0 || y < 0 || z < 0 {
            return None;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        if x >= dx || y >= dy || z >= dz {
            return None;
        }
        Some(volume[[x, y, z]])
    }

    #[inline]
    pub(crate) fn nearest<T: Sample>(volume: &ArrayView3<'_, T>, x: f64, y: f64, z: f64) -> T {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return T::default();
        }
        Self::fetch(volume, x.round() as i64, y.round() as i64, z.round() as i64)
            .unwrap_or_default()
    }

    /// Trilinear interpolation with zero-filled neighbours outside the volume.
    #[inline]
    pub(crate) fn trilinear<T: Sample>(volume: &ArrayView3<'_, T>, x: f64, y: f64, z: f64) -> f64 {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return 0.0;
        }
        let (xf, yf, zf) = (x.floor(), y.floor(), z.floor());
        let (nx, ny, nz) = volume.dim();
        // every neighbour lies outside the volume
        let outside = |f: f64, n: usize| f < -1.0 || f >= n as f64;
        if outside(xf, nx) || outside(yf, ny) || outside(zf, nz) {
            return 0.0;
        }
        let (x0, y0, z0) = (xf as i64, yf as i64, zf as i64);

        let dx = x - xf;
        let dy = y - yf;
        let dz = z - zf;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;
        let one_minus_dz = 1.0 - dz;

        let v = |ox: i64, oy: i64, oz: i64| {
            Self::fetch(volume, x0 + ox, y0 + oy, z0 + oz).map_or(0.0, Sample::to_f64)
        };

        let v00 = v(0, 0, 0).mul_add(one_minus_dx, v(1, 0, 0) * dx);
        let v10 = v(0, 1, 0).mul_add(one_minus_dx, v(1, 1, 0) * dx);
        let v01 = v(0, 0, 1).mul_add(one_minus_dx, v(1, 0, 1) * dx);
        let v11 = v(0, 1, 1).mul_add(one_minus_dx, v(1, 1, 1) * dx);

        let v0 = v00.mul_add(one_minus_dy, v10 * dy);
        let v1 = v01.mul_add(one_minus_dy, v11 * dy);

        v0.mul_add(one_minus_dz, v1 * dz)
    }
}

impl Interpolation {
    /// Sample `volume` at a fractional voxel coordinate.
    #[inline]
    pub fn sample<T: Sample>(&self, volume: &ArrayView3<'_, T>, coord: [f64; 3]) -> T {
        let [x, y, z] = coord;
        match self {
            Interpolation::Nearest => Interpolator::nearest(volume, x, y, z),
            Interpolation::Linear => T::from_f64(Interpolator::trilinear(volume, x, y, z)),
        }
    }
}
