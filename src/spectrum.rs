//! Parametric spectral upsampling (§4.A).
//!
//! Converts an sRGB color into a three-coefficient parametric spectrum
//! `S(λ) = sigmoid(c0·λ² + c1·λ + c2)` that reproduces the color under the
//! sRGB primaries and the D65 illuminant, following Jakob & Hanika's
//! "A Low-Dimensional Function Space for Efficient Spectral Upsampling".
//! The fit itself is expensive (the original implementation takes minutes),
//! so it is cached to disk as a flat binary table and interpolated at
//! runtime.

use glam::Vec3;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{PathTracerError, Result};

/// Lower bound of the visible spectrum used by the parametric model, in nm.
pub const CIE_LAMBDA_MIN: f32 = 360.0;
/// Upper bound of the visible spectrum used by the parametric model, in nm.
pub const CIE_LAMBDA_MAX: f32 = 830.0;

const DEFAULT_RESOLUTION: u32 = 64;
const GAUSS_NEWTON_ITERATIONS: usize = 15;
const WAVELENGTH_SAMPLES: usize = 95; // 360..=830 step 5nm

fn sample_wavelengths() -> [f32; WAVELENGTH_SAMPLES] {
    let mut out = [0.0f32; WAVELENGTH_SAMPLES];
    for (i, w) in out.iter_mut().enumerate() {
        *w = CIE_LAMBDA_MIN + (CIE_LAMBDA_MAX - CIE_LAMBDA_MIN) * (i as f32) / (WAVELENGTH_SAMPLES as f32 - 1.0);
    }
    out
}

fn gaussian_lobe(x: f32, mu: f32, sigma1: f32, sigma2: f32) -> f32 {
    let sigma = if x < mu { sigma1 } else { sigma2 };
    let t = (x - mu) / sigma;
    (-0.5 * t * t).exp()
}

/// Analytic multi-Gaussian approximation to the CIE 1931 2-degree color
/// matching functions (Wyman, Sloan & Shirley 2013).
fn cie_xyz(lambda: f32) -> Vec3 {
    let x = 1.056 * gaussian_lobe(lambda, 599.8, 37.9, 31.0)
        + 0.362 * gaussian_lobe(lambda, 442.0, 16.0, 26.7)
        - 0.065 * gaussian_lobe(lambda, 501.1, 20.4, 26.2);
    let y = 0.821 * gaussian_lobe(lambda, 568.8, 46.9, 40.5)
        + 0.286 * gaussian_lobe(lambda, 530.9, 16.3, 31.1);
    let z = 1.217 * gaussian_lobe(lambda, 437.0, 11.8, 36.0)
        + 0.681 * gaussian_lobe(lambda, 459.0, 26.0, 13.8);
    Vec3::new(x, y, z)
}

/// Coarse (10nm) relative spectral power distribution of CIE standard
/// illuminant D65, linearly interpolated between samples.
const D65_SPD: [(f32, f32); 54] = [
    (300.0, 0.03), (310.0, 1.66), (320.0, 3.29), (330.0, 11.77), (340.0, 20.24),
    (350.0, 28.64), (360.0, 37.05), (370.0, 38.50), (380.0, 39.95), (390.0, 42.43),
    (400.0, 44.91), (410.0, 45.78), (420.0, 46.64), (430.0, 49.36), (440.0, 52.09),
    (450.0, 51.03), (460.0, 49.98), (470.0, 52.31), (480.0, 54.65), (490.0, 68.70),
    (500.0, 70.67), (510.0, 72.48), (520.0, 74.29), (530.0, 67.98), (540.0, 61.66),
    (550.0, 65.74), (560.0, 69.83), (570.0, 72.49), (580.0, 75.14), (590.0, 69.34),
    (600.0, 63.30), (610.0, 55.01), (620.0, 46.71), (630.0, 56.61), (640.0, 66.51),
    (650.0, 65.09), (660.0, 63.68), (670.0, 67.99), (680.0, 72.49), (690.0, 70.40),
    (700.0, 68.31), (710.0, 66.78), (720.0, 65.24), (730.0, 63.84), (740.0, 62.45),
    (750.0, 70.22), (760.0, 77.99), (770.0, 71.41), (780.0, 60.91), (790.0, 57.47),
    (800.0, 70.02), (810.0, 66.31), (820.0, 84.71), (830.0, 48.24),
];

fn d65_relative_power(lambda: f32) -> f32 {
    if lambda <= D65_SPD[0].0 {
        return D65_SPD[0].1;
    }
    if lambda >= D65_SPD[D65_SPD.len() - 1].0 {
        return D65_SPD[D65_SPD.len() - 1].1;
    }
    for window in D65_SPD.windows(2) {
        let (l0, v0) = window[0];
        let (l1, v1) = window[1];
        if lambda >= l0 && lambda <= l1 {
            let t = (lambda - l0) / (l1 - l0);
            return v0 + (v1 - v0) * t;
        }
    }
    unreachable!("lambda {lambda} outside D65 table range")
}

/// sRGB primaries -> CIE XYZ, D65 white point (IEC 61966-2-1).
const SRGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

fn rgb_to_xyz(rgb: Vec3) -> Vec3 {
    Vec3::new(
        SRGB_TO_XYZ[0][0] * rgb.x + SRGB_TO_XYZ[0][1] * rgb.y + SRGB_TO_XYZ[0][2] * rgb.z,
        SRGB_TO_XYZ[1][0] * rgb.x + SRGB_TO_XYZ[1][1] * rgb.y + SRGB_TO_XYZ[1][2] * rgb.z,
        SRGB_TO_XYZ[2][0] * rgb.x + SRGB_TO_XYZ[2][1] * rgb.y + SRGB_TO_XYZ[2][2] * rgb.z,
    )
}

/// Evaluates `sigmoid(x) = 0.5 + x / (2*sqrt(1+x^2))`, bounded to `[0, 1]`
/// and numerically stable for large `|x|` (unlike a raw logistic form).
fn sigmoid(x: f32) -> f32 {
    0.5 + x / (2.0 * (1.0 + x * x).sqrt())
}

fn eval_spectrum(coeffs: Vec3, lambda: f32) -> f32 {
    sigmoid((coeffs.x * lambda + coeffs.y) * lambda + coeffs.z)
}

/// Integrates a fitted spectrum against the CIE matching functions and the
/// D65 illuminant, returning the resulting (un-normalized) XYZ tristimulus
/// values.
fn spectrum_to_xyz(coeffs: Vec3, normalization: f32) -> Vec3 {
    let mut xyz = Vec3::ZERO;
    for lambda in sample_wavelengths() {
        let s = eval_spectrum(coeffs, lambda);
        let illum = d65_relative_power(lambda);
        xyz += cie_xyz(lambda) * (s * illum);
    }
    xyz / normalization
}

fn cie_y_integral() -> f32 {
    sample_wavelengths()
        .iter()
        .map(|&lambda| cie_xyz(lambda).y * d65_relative_power(lambda))
        .sum()
}

/// Gauss-Newton fit of `(c0, c1, c2)` so that the resulting spectrum's XYZ
/// response (under D65) matches `target_xyz`, using a finite-difference
/// Jacobian. Starts from the zero vector (a flat, mid-gray spectrum).
fn fit_coefficients(target_xyz: Vec3, normalization: f32) -> Vec3 {
    let mut c = Vec3::ZERO;
    const EPS: f32 = 1e-3;

    for _ in 0..GAUSS_NEWTON_ITERATIONS {
        let residual = spectrum_to_xyz(c, normalization) - target_xyz;

        let mut jacobian = [[0.0f32; 3]; 3]; // d(xyz_i) / d(c_j)
        for axis in 0..3 {
            let mut delta = Vec3::ZERO;
            delta[axis] = EPS;
            let plus = spectrum_to_xyz(c + delta, normalization);
            let minus = spectrum_to_xyz(c - delta, normalization);
            let derivative = (plus - minus) / (2.0 * EPS);
            jacobian[0][axis] = derivative.x;
            jacobian[1][axis] = derivative.y;
            jacobian[2][axis] = derivative.z;
        }

        // Solve J * delta = -residual via Cramer's rule (3x3 system).
        let det = mat3_det(jacobian);
        if det.abs() < 1e-12 {
            break;
        }
        let neg_residual = [-residual.x, -residual.y, -residual.z];
        let delta_c = solve3(jacobian, neg_residual, det);

        c += Vec3::new(delta_c[0], delta_c[1], delta_c[2]);

        if delta_c[0].abs() + delta_c[1].abs() + delta_c[2].abs() < 1e-6 {
            break;
        }
    }

    c
}

fn mat3_det(m: [[f32; 3]; 3]) -> f32 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn solve3(m: [[f32; 3]; 3], b: [f32; 3], det: f32) -> [f32; 3] {
    let mut result = [0.0f32; 3];
    for col in 0..3 {
        let mut replaced = m;
        for row in 0..3 {
            replaced[row][col] = b[row];
        }
        result[col] = mat3_det(replaced) / det;
    }
    result
}

/// A cached, resolution-R³ lookup table mapping normalized sRGB colors to
/// parametric spectrum coefficients.
///
/// Layout: indexed by `[largest_component][z][y][x]`, where `z` runs over
/// the largest channel's own value and `x`/`y` run over the other two
/// channels normalized by it, matching the persisted flat binary layout
/// (resolution, then `3 * R³ * 3` floats, big-component-major / y-major /
/// x-major).
#[derive(Debug, Clone)]
pub struct SpectrumTable {
    resolution: u32,
    // [largest_axis][z][y][x] -> (c0, c1, c2)
    data: Vec<[f32; 3]>,
}

impl SpectrumTable {
    /// Resolution (`R`) of the cube along each axis.
    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    fn index(&self, axis: usize, zi: u32, yi: u32, xi: u32) -> usize {
        let r = self.resolution as usize;
        (((axis * r + zi as usize) * r + yi as usize) * r) + xi as usize
    }

    /// Loads a cached table from `path`, or builds one from scratch and
    /// persists it if the file does not exist.
    pub fn load_or_build<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(table) => Ok(table),
            Err(PathTracerError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "{} not found, generating it; this may take a while",
                    path.display()
                );
                let table = Self::build_for_srgb(DEFAULT_RESOLUTION);
                table.save(path)?;
                Ok(table)
            }
            Err(other) => Err(other),
        }
    }

    /// Parses the binary format from §6: little-endian `u32` resolution
    /// followed by `3 * R³ * 3` `f32` coefficients.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut resolution_bytes = [0u8; 4];
        file.read_exact(&mut resolution_bytes)?;
        let resolution = u32::from_le_bytes(resolution_bytes);

        let expected_floats = 3usize
            * (resolution as usize).pow(3)
            * 3;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        if raw.len() != expected_floats * 4 {
            return Err(PathTracerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "spectrum table file has the wrong size for its resolution header",
            )));
        }

        let mut data = Vec::with_capacity(expected_floats / 3);
        for chunk in raw.chunks_exact(12) {
            let c0 = f32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let c1 = f32::from_le_bytes(chunk[4..8].try_into().unwrap());
            let c2 = f32::from_le_bytes(chunk[8..12].try_into().unwrap());
            data.push([c0, c1, c2]);
        }

        Ok(Self { resolution, data })
    }

    /// Persists the table in the binary format described in §6.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&self.resolution.to_le_bytes())?;
        for coeffs in &self.data {
            for c in coeffs {
                file.write_all(&c.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Computes the table from scratch by least-squares fitting against
    /// the sRGB primaries and D65 illuminant. Expensive (the reference
    /// implementation describes this as taking minutes); callers should
    /// cache the result via [`SpectrumTable::save`].
    #[must_use]
    pub fn build_for_srgb(resolution: u32) -> Self {
        let r = resolution as usize;
        let mut data = vec![[0.0f32; 3]; 3 * r * r * r];
        let normalization = cie_y_integral();

        for axis in 0..3 {
            for zi in 0..r {
                // Biases samples toward the gamut boundary, as in the
                // original construction.
                let z = zi as f32 / (r as f32 - 1.0).max(1.0);
                let smooth_z = z * z * (3.0 - 2.0 * z);

                for yi in 0..r {
                    let y = yi as f32 / (r as f32 - 1.0).max(1.0);
                    for xi in 0..r {
                        let x = xi as f32 / (r as f32 - 1.0).max(1.0);

                        let mut rgb = Vec3::ZERO;
                        rgb[axis] = smooth_z;
                        rgb[(axis + 1) % 3] = x * smooth_z;
                        rgb[(axis + 2) % 3] = y * smooth_z;

                        let target_xyz = rgb_to_xyz(rgb);
                        let coeffs = fit_coefficients(target_xyz, normalization);

                        let index = ((axis * r + zi) * r + yi) * r + xi;
                        data[index] = [coeffs.x, coeffs.y, coeffs.z];
                    }
                }
            }
        }

        Self { resolution, data }
    }
}

/// Upsamples an sRGB color into parametric spectrum coefficients
/// `(c0, c1, c2)`, trilinearly interpolating the cached lookup table.
///
/// Pure and total: black/gray inputs fall back to the zero-coefficient
/// (flat mid-gray) spectrum rather than dividing by zero.
#[must_use]
pub fn coefficients(table: &SpectrumTable, rgb: Vec3) -> Vec3 {
    let rgb = rgb.max(Vec3::ZERO);
    let max_component = rgb.x.max(rgb.y).max(rgb.z);
    if max_component <= 0.0 {
        return Vec3::ZERO;
    }

    let axis = if rgb.x >= rgb.y && rgb.x >= rgb.z {
        0
    } else if rgb.y >= rgb.z {
        1
    } else {
        2
    };

    let z = max_component.clamp(0.0, 1.0);
    let x = (rgb[(axis + 1) % 3] / max_component).clamp(0.0, 1.0);
    let y = (rgb[(axis + 2) % 3] / max_component).clamp(0.0, 1.0);

    trilinear_lookup(table, axis, x, y, z)
}

fn trilinear_lookup(table: &SpectrumTable, axis: usize, x: f32, y: f32, z: f32) -> Vec3 {
    let r = table.resolution;
    if r < 2 {
        let idx = table.index(axis, 0, 0, 0);
        let c = table.data[idx];
        return Vec3::new(c[0], c[1], c[2]);
    }

    let scale = (r - 1) as f32;
    let (x0, x1, fx) = lattice(x * scale, r);
    let (y0, y1, fy) = lattice(y * scale, r);
    let (z0, z1, fz) = lattice(z * scale, r);

    let mut out = Vec3::ZERO;
    for (zi, wz) in [(z0, 1.0 - fz), (z1, fz)] {
        for (yi, wy) in [(y0, 1.0 - fy), (y1, fy)] {
            for (xi, wx) in [(x0, 1.0 - fx), (x1, fx)] {
                let weight = wz * wy * wx;
                if weight <= 0.0 {
                    continue;
                }
                let idx = table.index(axis, zi, yi, xi);
                let c = table.data[idx];
                out += Vec3::new(c[0], c[1], c[2]) * weight;
            }
        }
    }
    out
}

fn lattice(v: f32, resolution: u32) -> (u32, u32, f32) {
    let max_index = resolution - 1;
    let v = v.clamp(0.0, max_index as f32);
    let i0 = v.floor() as u32;
    let i1 = (i0 + 1).min(max_index);
    let frac = v - i0 as f32;
    (i0, i1, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_table() -> SpectrumTable {
        SpectrumTable::build_for_srgb(4)
    }

    #[test]
    fn coefficients_is_total_for_black() {
        let table = tiny_table();
        let c = coefficients(&table, Vec3::ZERO);
        assert_eq!(c, Vec3::ZERO);
    }

    #[test]
    fn coefficients_is_finite_for_saturated_colors() {
        let table = tiny_table();
        for rgb in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE, Vec3::new(0.2, 0.8, 0.4)] {
            let c = coefficients(&table, rgb);
            assert!(c.is_finite(), "{rgb:?} -> {c:?}");
        }
    }

    #[test]
    fn white_spectrum_is_flat_near_one() {
        let table = tiny_table();
        let c = coefficients(&table, Vec3::ONE);
        // A flat spectrum near full reflectance should evaluate close to 1
        // across the visible range.
        let mid = eval_spectrum(c, 560.0);
        assert!(mid > 0.5, "expected near-white spectrum, got {mid}");
    }

    #[test]
    fn round_trip_file() {
        let table = SpectrumTable::build_for_srgb(3);
        let path = std::env::temp_dir().join("pathtracer_scene_spectrum_test.dat");
        table.save(&path).unwrap();
        let loaded = SpectrumTable::load(&path).unwrap();
        assert_eq!(loaded.resolution(), table.resolution());
        assert_eq!(loaded.data.len(), table.data.len());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn malformed_file_is_an_io_error() {
        let path = std::env::temp_dir().join("pathtracer_scene_spectrum_bad.dat");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let result = SpectrumTable::load(&path);
        assert!(result.is_err());
        let _ = std::fs::remove_file(&path);
    }
}
