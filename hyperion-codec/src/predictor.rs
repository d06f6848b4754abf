// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `predictor` module implements the adaptive per-band linear predictor and its exact
//! inverse.
//!
//! Every sample is predicted from a weighted sum of local differences of previously visited
//! cells, and the signed prediction error is folded into a non-negative mapped residual. The
//! weights are nudged after every sample by a sign-only LMS rule. The inverse direction
//! ([`unpredict`]) recomputes every intermediate quantity from the already-reconstructed
//! history, so the two directions stay bit-exact mirrors of one another by sharing all of the
//! arithmetic helpers below.
//!
//! Bands are always walked outermost, rows then columns within a band, regardless of how the
//! input or the payload is interleaved.

use log::debug;

use hyperion_core::cube::alloc_cells;
use hyperion_core::errors::{overflow_error, Result};
use hyperion_core::meta::{ImageParams, NeighborSum, PredictorParams};
use hyperion_core::scan::CubeShape;
use hyperion_core::util::bits::sign_extend_leq32_to_i32;

/// Configuration-derived constants shared by both pipeline directions.
struct Model {
    shape: CubeShape,
    d: u32,
    signed: bool,
    mask: u64,
    s_min: i64,
    s_max: i64,
    s_mid: i64,
    neighbor_sum: NeighborSum,
    full: bool,
    /// Number of previous-band components, already clamped to the available bands.
    p: usize,
    /// Total weight components: p central differences plus three directional in full mode.
    components: usize,
    omega: u32,
    /// Saturation bounds of the inner-product register.
    reg_min: i64,
    reg_max: i64,
    /// Clamp bounds of the weights.
    w_min: i64,
    w_max: i64,
    t_inc: i64,
    nu_min: i64,
    nu_max: i64,
}

impl Model {
    fn new(image: &ImageParams, params: &PredictorParams) -> Model {
        let p = params.effective_bands(image.z_size) as usize;
        let omega = params.weight_resolution;
        let r = params.register_size;

        Model {
            shape: image.shape(),
            d: image.dyn_range,
            signed: image.signed,
            mask: (1u64 << image.dyn_range) - 1,
            s_min: image.sample_min(),
            s_max: image.sample_max(),
            s_mid: image.sample_mid(),
            neighbor_sum: params.neighbor_sum,
            full: params.full,
            p,
            components: p + if params.full { 3 } else { 0 },
            omega,
            // Computed by shifting down from the full width so that r == 64 stays in range.
            reg_min: i64::MIN >> (64 - r),
            reg_max: i64::MAX >> (64 - r),
            w_min: -(1i64 << (omega + 2)),
            w_max: (1i64 << (omega + 2)) - 1,
            t_inc: i64::from(params.weight_interval),
            nu_min: i64::from(params.weight_initial),
            nu_max: i64::from(params.weight_final),
        }
    }

    /// Reads the cell at `(x, y, z)`, sign extending from the dynamic range when samples are
    /// signed.
    #[inline(always)]
    fn cell(&self, buf: &[u16], x: u32, y: u32, z: u32) -> i64 {
        let raw = u32::from(buf[self.shape.bsq_index(x, y, z)]);
        if self.signed {
            i64::from(sign_extend_leq32_to_i32(raw, self.d))
        }
        else {
            i64::from(raw)
        }
    }

    #[inline(always)]
    fn store(&self, buf: &mut [u16], x: u32, y: u32, z: u32, value: i64) {
        buf[self.shape.bsq_index(x, y, z)] = ((value as u64) & self.mask) as u16;
    }

    /// The local sum at `(x, y, z)`. Only defined past the very first cell of a band.
    fn local_sum(&self, buf: &[u16], x: u32, y: u32, z: u32) -> i64 {
        let last_col = self.shape.x_size - 1;

        match self.neighbor_sum {
            NeighborSum::Wide => {
                if y > 0 {
                    let n = self.cell(buf, x, y - 1, z);

                    if x == 0 {
                        // A single-column image has no north-east neighbor; the north cell
                        // substitutes.
                        let ne =
                            if x + 1 < self.shape.x_size { self.cell(buf, x + 1, y - 1, z) } else { n };
                        2 * (n + ne)
                    }
                    else if x == last_col {
                        self.cell(buf, x - 1, y, z) + self.cell(buf, x - 1, y - 1, z) + 2 * n
                    }
                    else {
                        self.cell(buf, x - 1, y, z)
                            + self.cell(buf, x - 1, y - 1, z)
                            + n
                            + self.cell(buf, x + 1, y - 1, z)
                    }
                }
                else {
                    4 * self.cell(buf, x - 1, y, z)
                }
            }
            NeighborSum::Narrow => {
                if y > 0 {
                    let n = self.cell(buf, x, y - 1, z);

                    if x == 0 {
                        let ne =
                            if x + 1 < self.shape.x_size { self.cell(buf, x + 1, y - 1, z) } else { n };
                        2 * (n + ne)
                    }
                    else if x == last_col {
                        self.cell(buf, x - 1, y - 1, z) + 3 * n
                    }
                    else {
                        self.cell(buf, x - 1, y - 1, z) + 2 * n + self.cell(buf, x + 1, y - 1, z)
                    }
                }
                else if z > 0 {
                    4 * self.cell(buf, x - 1, y, z - 1)
                }
                else {
                    4 * self.s_mid
                }
            }
        }
    }

    /// Predicts the first cell of band `z` from the band below, or from the sample-range
    /// midpoint when no band is available. Returns `(predicted, double_resolution)`.
    fn predict_first(&self, buf: &[u16], z: u32) -> (i64, i64) {
        let s_tilde = if z > 0 && self.p > 0 { 2 * self.cell(buf, 0, 0, z - 1) } else { 2 * self.s_mid };
        (s_tilde >> 1, s_tilde)
    }

    /// Predicts the cell at `(x, y, z)` for t > 0, filling `u` with the local-difference vector
    /// used by the subsequent weight update. Returns `(predicted, double_resolution)`.
    fn predict_at(
        &self,
        buf: &[u16],
        weights: &[i64],
        u: &mut [i64],
        x: u32,
        y: u32,
        z: u32,
    ) -> (i64, i64) {
        let sigma = self.local_sum(buf, x, y, z);

        // Central local differences of the p previous bands. Bands below z - p do not exist;
        // their components stay zero and contribute nothing to the product or the update.
        let p_z = self.p.min(z as usize);

        for (i, slot) in u[..self.p].iter_mut().enumerate() {
            *slot = if i < p_z {
                let zz = z - (i as u32 + 1);
                4 * self.cell(buf, x, y, zz) - self.local_sum(buf, x, y, zz)
            }
            else {
                0
            };
        }

        // Directional local differences of the current band in full mode. On the top row all
        // three are zero; on the first column the north cell substitutes for the missing west
        // neighbors.
        if self.full {
            let (d_n, d_w, d_nw) = if y > 0 {
                let d_n = 4 * self.cell(buf, x, y - 1, z) - sigma;

                if x > 0 {
                    (
                        d_n,
                        4 * self.cell(buf, x - 1, y, z) - sigma,
                        4 * self.cell(buf, x - 1, y - 1, z) - sigma,
                    )
                }
                else {
                    (d_n, d_n, d_n)
                }
            }
            else {
                (0, 0, 0)
            };

            u[self.p] = d_n;
            u[self.p + 1] = d_w;
            u[self.p + 2] = d_nw;
        }

        // Signed inner product, saturated to the register width. The operand bounds keep the
        // unsaturated sum well inside i64.
        let mut dot: i64 = 0;
        for (&w, &du) in weights.iter().zip(u.iter()) {
            dot += w * du;
        }
        let d_hat = dot.clamp(self.reg_min, self.reg_max);

        // Scale the local sum up to the weight resolution and fold in the predicted central
        // difference. The s_mid recentering terms of the full expression cancel exactly,
        // leaving the local sum itself. Both the local sum and the product sit at four times
        // the sample scale, so the high-resolution value carries Ω + 2 fractional bits; the
        // clamp keeps the shifted-down prediction inside the sample range.
        let hr = i128::from(d_hat)
            + (i128::from(sigma) << self.omega)
            + (1i128 << (self.omega + 1));

        let lo = i128::from(self.s_min) << (self.omega + 2);
        let hi = (i128::from(self.s_max) << (self.omega + 2)) + (1i128 << (self.omega + 1));

        let s_tilde = (hr.clamp(lo, hi) >> (self.omega + 1)) as i64;

        (s_tilde >> 1, s_tilde)
    }

    /// Folds the signed prediction error into a non-negative residual. One-to-one given the
    /// predicted value.
    fn map_error(&self, e: i64, pred: i64) -> i64 {
        let theta = (pred - self.s_min).min(self.s_max - pred);

        if e.abs() > theta {
            e.abs() + theta
        }
        else if pred <= (self.s_min + self.s_max) >> 1 {
            // Errors toward the far (upper) bound take the even codes.
            if e >= 0 {
                2 * e
            }
            else {
                -2 * e - 1
            }
        }
        else {
            if e <= 0 {
                -2 * e
            }
            else {
                2 * e - 1
            }
        }
    }

    /// The inverse of [`Model::map_error`].
    fn unmap_error(&self, delta: i64, pred: i64) -> i64 {
        let theta = (pred - self.s_min).min(self.s_max - pred);
        let lower = pred <= (self.s_min + self.s_max) >> 1;

        if delta > 2 * theta {
            if lower {
                delta - theta
            }
            else {
                theta - delta
            }
        }
        else if delta & 1 == 0 {
            if lower {
                delta / 2
            }
            else {
                -delta / 2
            }
        }
        else {
            if lower {
                -(delta + 1) / 2
            }
            else {
                (delta + 1) / 2
            }
        }
    }

    /// Nudges every weight by the sign of the double-resolution error, scaled by the scheduled
    /// shift, then clamps.
    fn update_weights(&self, weights: &mut [i64], u: &[i64], t: i64, s: i64, s_tilde: i64) {
        let nx = i64::from(self.shape.x_size);
        let rho = (self.nu_min + (t - nx).div_euclid(self.t_inc)).clamp(self.nu_min, self.nu_max)
            + i64::from(self.d)
            - i64::from(self.omega);

        let sign = (2 * s - s_tilde).signum();

        for (w, &du) in weights.iter_mut().zip(u.iter()) {
            let scaled =
                if rho >= 0 { (sign * du) >> rho } else { (sign * du) << -rho };
            *w = (*w + ((scaled + 1) >> 1)).clamp(self.w_min, self.w_max);
        }
    }

    /// Builds the per-band weight tables: either the explicit table shifted up to the working
    /// resolution, or the default geometric fade.
    fn init_weights(&self, params: &PredictorParams) -> Vec<Vec<i64>> {
        match params.weight_init {
            Some(ref init) => {
                let shift = self.omega + 3 - init.resolution;
                init.table
                    .iter()
                    .map(|row| row.iter().map(|&v| i64::from(v) << shift).collect())
                    .collect()
            }
            None => {
                let mut row = vec![0i64; self.components];
                if self.components > 0 {
                    row[0] = 7 << (self.omega - 3);
                    for i in 1..self.components {
                        row[i] = row[i - 1] / 2;
                    }
                }
                vec![row; self.shape.z_size as usize]
            }
        }
    }
}

/// Runs the predictor over a band-sequential sample cube, producing the mapped residual cube in
/// the same layout.
pub fn predict(
    image: &ImageParams,
    params: &PredictorParams,
    samples: &[u16],
) -> Result<Vec<u16>> {
    let model = Model::new(image, params);

    debug_assert!(samples.len() == model.shape.volume());

    let mut residuals = alloc_cells(model.shape.volume())?;
    let mut weights = model.init_weights(params);
    let mut u = vec![0i64; model.components];

    for z in 0..model.shape.z_size {
        for y in 0..model.shape.y_size {
            for x in 0..model.shape.x_size {
                let t = i64::from(y) * i64::from(model.shape.x_size) + i64::from(x);

                let (pred, s_tilde) = if t == 0 {
                    model.predict_first(samples, z)
                }
                else {
                    model.predict_at(samples, &weights[z as usize], &mut u, x, y, z)
                };

                let s = model.cell(samples, x, y, z);

                residuals[model.shape.bsq_index(x, y, z)] =
                    model.map_error(s - pred, pred) as u16;

                if t > 0 {
                    model.update_weights(&mut weights[z as usize], &u, t, s, s_tilde);
                }
            }
        }
    }

    debug!("predicted {} residuals over {} bands", residuals.len(), model.shape.z_size);

    Ok(residuals)
}

/// The exact inverse of [`predict`]: reconstructs the sample cube from the mapped residual
/// cube, mirroring every arithmetic step against the already-reconstructed history.
pub fn unpredict(
    image: &ImageParams,
    params: &PredictorParams,
    residuals: &[u16],
) -> Result<Vec<u16>> {
    let model = Model::new(image, params);

    debug_assert!(residuals.len() == model.shape.volume());

    let mut cube = alloc_cells(model.shape.volume())?;
    let mut weights = model.init_weights(params);
    let mut u = vec![0i64; model.components];

    for z in 0..model.shape.z_size {
        for y in 0..model.shape.y_size {
            for x in 0..model.shape.x_size {
                let t = i64::from(y) * i64::from(model.shape.x_size) + i64::from(x);

                let (pred, s_tilde) = if t == 0 {
                    model.predict_first(&cube, z)
                }
                else {
                    model.predict_at(&cube, &weights[z as usize], &mut u, x, y, z)
                };

                let delta = i64::from(residuals[model.shape.bsq_index(x, y, z)]);
                let s = pred + model.unmap_error(delta, pred);

                if s < model.s_min || s > model.s_max {
                    return overflow_error("reconstructed sample escaped the sample range");
                }

                model.store(&mut cube, x, y, z, s);

                if t > 0 {
                    model.update_weights(&mut weights[z as usize], &u, t, s, s_tilde);
                }
            }
        }
    }

    Ok(cube)
}
