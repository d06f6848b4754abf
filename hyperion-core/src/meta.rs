// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `meta` module defines the typed configuration records consumed by the codec.
//!
//! A compression call is configured by three records: [`ImageParams`] describing the raw cube,
//! [`PredictorParams`] controlling the adaptive predictor, and [`EncoderParams`] selecting and
//! tuning the entropy coder. The same records are recovered from the compressed-stream header on
//! decompression.
//!
//! Validation is fail-fast: the first offending field is reported and nothing is allocated
//! before every record has been checked.

use crate::errors::{config_error, Result};
use crate::scan::{CubeShape, Interleaving};

/// The on-disk byte order of raw 2-byte sample words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Describes the raw input cube.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageParams {
    /// Number of columns.
    pub x_size: u32,
    /// Number of rows.
    pub y_size: u32,
    /// Number of spectral bands.
    pub z_size: u32,
    /// Bit width of a raw sample, 2 to 16.
    pub dyn_range: u32,
    /// Whether samples are signed two's complement.
    pub signed: bool,
    /// Layout of the raw sample words.
    pub interleaving: Interleaving,
    /// Band-group depth, meaningful only for BIL.
    pub interleaving_depth: u32,
    /// Byte order of the raw sample words.
    pub byte_order: ByteOrder,
    /// Free-form byte carried in the stream header.
    pub user_data: u8,
}

impl ImageParams {
    pub fn shape(&self) -> CubeShape {
        CubeShape::new(self.x_size, self.y_size, self.z_size)
    }

    /// The smallest representable sample value.
    #[inline(always)]
    pub fn sample_min(&self) -> i64 {
        if self.signed {
            -(1i64 << (self.dyn_range - 1))
        }
        else {
            0
        }
    }

    /// The largest representable sample value.
    #[inline(always)]
    pub fn sample_max(&self) -> i64 {
        if self.signed {
            (1i64 << (self.dyn_range - 1)) - 1
        }
        else {
            (1i64 << self.dyn_range) - 1
        }
    }

    /// The midpoint the predictor falls back to when no history exists.
    #[inline(always)]
    pub fn sample_mid(&self) -> i64 {
        if self.signed {
            0
        }
        else {
            1i64 << (self.dyn_range - 1)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.x_size == 0 || self.y_size == 0 || self.z_size == 0 {
            return config_error("image: all of x, y, and z extents must be greater than 0");
        }
        if self.x_size > 0xffff || self.y_size > 0xffff || self.z_size > 0xffff {
            return config_error("image: extents must fit the 16-bit header fields");
        }
        if self.interleaving == Interleaving::Bil
            && (self.interleaving_depth < 1 || self.interleaving_depth > self.z_size)
        {
            return config_error(
                "image: interleaving depth must be a positive integer not bigger than the band \
                 count",
            );
        }
        if self.dyn_range < 2 || self.dyn_range > 16 {
            return config_error("image: dynamic range must be between 2 and 16 bits");
        }
        Ok(())
    }
}

/// Choice of local-sum neighborhood.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborSum {
    /// Four-neighbor sum over W, NW, N, and NE.
    Wide,
    /// Previous-row sum over NW, N, and NE, falling back to the band below on the first row.
    Narrow,
}

/// An explicit per-band weight initialization table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightInit {
    /// Bit resolution of the table entries, 3 to Ω+3.
    pub resolution: u32,
    /// One row per band, one entry per weight component.
    pub table: Vec<Vec<i32>>,
}

/// Controls the adaptive linear predictor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredictorParams {
    /// Number of previous bands used for prediction, 0 to 15.
    pub bands: u32,
    /// Full mode adds the three directional local differences to the predictor input.
    pub full: bool,
    /// Local-sum formula selection.
    pub neighbor_sum: NeighborSum,
    /// Width of the signed inner-product accumulator, 32 to 64.
    pub register_size: u32,
    /// Fixed-point scale Ω of the weights, 4 to 19.
    pub weight_resolution: u32,
    /// Weight-update scaling exponent change interval, a power of two in [2^4, 2^11].
    pub weight_interval: u32,
    /// Initial scaling exponent parameter, -6 to 9.
    pub weight_initial: i32,
    /// Final scaling exponent parameter, -6 to 9.
    pub weight_final: i32,
    /// Optional explicit weight initialization; defaults per the standard when absent.
    pub weight_init: Option<WeightInit>,
}

impl PredictorParams {
    /// The number of weight components: P central differences plus, in full mode, the three
    /// directional differences.
    pub fn components(&self) -> usize {
        self.bands as usize + if self.full { 3 } else { 0 }
    }

    /// The band count actually used for prediction: P never exceeds the available earlier bands.
    pub fn effective_bands(&self, z_size: u32) -> u32 {
        self.bands.min(z_size - 1)
    }

    pub fn validate(&self, image: &ImageParams) -> Result<()> {
        if self.bands > 15 {
            return config_error("predictor: at most 15 previous bands can be used");
        }
        if self.register_size < 32 || self.register_size > 64 {
            return config_error("predictor: register size must be in the range [32, 64]");
        }
        if self.weight_resolution < 4 || self.weight_resolution > 19 {
            return config_error("predictor: weight resolution must be in the range [4, 19]");
        }
        if self.weight_interval < (1 << 4) || self.weight_interval > (1 << 11) {
            return config_error(
                "predictor: weight update interval must be in the range [2^4, 2^11]",
            );
        }
        if !self.weight_interval.is_power_of_two() {
            return config_error("predictor: weight update interval must be a power of 2");
        }
        if self.weight_initial > 9 || self.weight_initial < -6 {
            return config_error("predictor: weight initial value must be in the range [-6, 9]");
        }
        if self.weight_final > 9 || self.weight_final < -6 {
            return config_error("predictor: weight final value must be in the range [-6, 9]");
        }
        if self.weight_final < self.weight_initial {
            return config_error(
                "predictor: weight final value must not be less than the initial value",
            );
        }

        if let Some(ref init) = self.weight_init {
            if init.resolution < 3 || init.resolution > self.weight_resolution + 3 {
                return config_error(
                    "predictor: weight init resolution must be in the range [3, omega + 3]",
                );
            }
            if init.table.len() != image.z_size as usize {
                return config_error("predictor: weight init table must have one row per band");
            }
            let lo = -(1i64 << (init.resolution - 1));
            let hi = (1i64 << (init.resolution - 1)) - 1;
            for row in &init.table {
                if row.len() != self.components() {
                    return config_error(
                        "predictor: weight init rows must have one entry per component",
                    );
                }
                if row.iter().any(|&w| i64::from(w) < lo || i64::from(w) > hi) {
                    return config_error(
                        "predictor: weight init entries exceed the init resolution",
                    );
                }
            }
        }

        Ok(())
    }
}

/// Seed for the sample-adaptive accumulators: one constant for every band, or a per-band table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccumulatorInit {
    Constant(u32),
    PerBand(Vec<u32>),
}

impl AccumulatorInit {
    /// The accumulator initialization constant for band `z`.
    pub fn for_band(&self, z: u32) -> u32 {
        match *self {
            AccumulatorInit::Constant(k) => k,
            AccumulatorInit::PerBand(ref table) => table[z as usize],
        }
    }
}

/// Tuning of the sample-adaptive Golomb coder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleAdaptiveParams {
    /// Initial count exponent y_0, 1 to 8.
    pub initial_count_exponent: u32,
    /// Rescaling counter size y*, max(4, y_0 + 1) to 9.
    pub rescale_counter_size: u32,
    /// Unary length limit u_max, 8 to 32.
    pub unary_limit: u32,
    /// Accumulator seeds.
    pub accumulator: AccumulatorInit,
}

/// Tuning of the block-adaptive coder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAdaptiveParams {
    /// Symbols per block: 8, 16, 32, or 64.
    pub block_size: u32,
    /// Every J-th block is a reference block, 1 to 4096.
    pub reference_interval: u32,
}

/// The entropy coding strategy together with its strategy-specific parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodingMethod {
    SampleAdaptive(SampleAdaptiveParams),
    BlockAdaptive(BlockAdaptiveParams),
}

/// Controls the entropy coding stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderParams {
    /// Scan order of the residuals within the payload. Independent of the input layout.
    pub interleaving: Interleaving,
    /// Band-group depth of the payload order, meaningful only for BIL.
    pub interleaving_depth: u32,
    /// The compressed stream is zero-padded to a multiple of `8 * word_size` bits, 1 to 8.
    pub word_size: u32,
    /// The coder and its parameters.
    pub method: EncodingMethod,
}

impl EncoderParams {
    pub fn validate(&self, image: &ImageParams) -> Result<()> {
        if self.interleaving == Interleaving::Bil
            && (self.interleaving_depth < 1 || self.interleaving_depth > image.z_size)
        {
            return config_error(
                "encoder: interleaving depth must be a positive integer not bigger than the band \
                 count",
            );
        }
        if self.word_size < 1 || self.word_size > 8 {
            return config_error("encoder: output word size must be in the range [1, 8]");
        }

        match self.method {
            EncodingMethod::SampleAdaptive(ref sa) => {
                if sa.initial_count_exponent < 1 || sa.initial_count_exponent > 8 {
                    return config_error(
                        "encoder: initial count exponent y_0 must be in the range [1, 8]",
                    );
                }
                if sa.rescale_counter_size > 9
                    || sa.rescale_counter_size < 4
                    || sa.rescale_counter_size < sa.initial_count_exponent + 1
                {
                    return config_error(
                        "encoder: rescaling counter size y* must be in the range \
                         [max(4, y_0 + 1), 9]",
                    );
                }
                if sa.unary_limit < 8 || sa.unary_limit > 32 {
                    return config_error(
                        "encoder: unary length limit u_max must be in the range [8, 32]",
                    );
                }

                let k_max = image.dyn_range - 2;
                match sa.accumulator {
                    AccumulatorInit::Constant(k) => {
                        if k > k_max {
                            return config_error(
                                "encoder: accumulator init constant cannot exceed d - 2",
                            );
                        }
                    }
                    AccumulatorInit::PerBand(ref table) => {
                        if table.len() != image.z_size as usize {
                            return config_error(
                                "encoder: accumulator init table must have one entry per band",
                            );
                        }
                        if table.iter().any(|&k| k > k_max) {
                            return config_error(
                                "encoder: accumulator init entries cannot exceed d - 2",
                            );
                        }
                    }
                }
            }
            EncodingMethod::BlockAdaptive(ref ba) => {
                if ba.reference_interval < 1 || ba.reference_interval > 4096 {
                    return config_error(
                        "encoder: reference interval must be a positive integer not larger than \
                         4096",
                    );
                }
                if !matches!(ba.block_size, 8 | 16 | 32 | 64) {
                    return config_error("encoder: block size must be equal to 8, 16, 32, or 64");
                }
            }
        }

        Ok(())
    }
}

/// Validates a full configuration in dependency order, before any allocation.
pub fn validate_config(
    image: &ImageParams,
    predictor: &PredictorParams,
    encoder: &EncoderParams,
) -> Result<()> {
    image.validate()?;
    predictor.validate(image)?;
    encoder.validate(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageParams {
        ImageParams {
            x_size: 4,
            y_size: 4,
            z_size: 3,
            dyn_range: 8,
            signed: false,
            interleaving: Interleaving::Bsq,
            interleaving_depth: 1,
            byte_order: ByteOrder::Little,
            user_data: 0,
        }
    }

    fn predictor() -> PredictorParams {
        PredictorParams {
            bands: 2,
            full: false,
            neighbor_sum: NeighborSum::Wide,
            register_size: 32,
            weight_resolution: 14,
            weight_interval: 32,
            weight_initial: -1,
            weight_final: 3,
            weight_init: None,
        }
    }

    #[test]
    fn verify_sample_bounds() {
        let mut img = image();
        assert_eq!(img.sample_min(), 0);
        assert_eq!(img.sample_max(), 255);
        assert_eq!(img.sample_mid(), 128);

        img.signed = true;
        assert_eq!(img.sample_min(), -128);
        assert_eq!(img.sample_max(), 127);
        assert_eq!(img.sample_mid(), 0);
    }

    #[test]
    fn verify_validation_rejects_bad_dyn_range() {
        let mut img = image();
        img.dyn_range = 1;
        assert!(img.validate().is_err());
        img.dyn_range = 17;
        assert!(img.validate().is_err());
    }

    #[test]
    fn verify_validation_rejects_bad_weight_interval() {
        let img = image();
        let mut pred = predictor();
        pred.weight_interval = 48;
        assert!(pred.validate(&img).is_err());
        pred.weight_interval = 1 << 12;
        assert!(pred.validate(&img).is_err());
    }

    #[test]
    fn verify_validation_rejects_short_weight_table() {
        let img = image();
        let mut pred = predictor();
        pred.weight_init = Some(WeightInit { resolution: 5, table: vec![vec![0, 0]; 2] });
        assert!(pred.validate(&img).is_err());

        pred.weight_init = Some(WeightInit { resolution: 5, table: vec![vec![0, 0]; 3] });
        assert!(pred.validate(&img).is_ok());
    }

    #[test]
    fn verify_validation_rejects_bad_sample_params() {
        let img = image();
        let mut enc = EncoderParams {
            interleaving: Interleaving::Bsq,
            interleaving_depth: 1,
            word_size: 1,
            method: EncodingMethod::SampleAdaptive(SampleAdaptiveParams {
                initial_count_exponent: 8,
                rescale_counter_size: 8,
                unary_limit: 16,
                accumulator: AccumulatorInit::Constant(2),
            }),
        };

        // y* must be at least y_0 + 1.
        assert!(enc.validate(&img).is_err());

        enc.method = EncodingMethod::SampleAdaptive(SampleAdaptiveParams {
            initial_count_exponent: 4,
            rescale_counter_size: 8,
            unary_limit: 16,
            accumulator: AccumulatorInit::Constant(7),
        });

        // k exceeds d - 2.
        assert!(enc.validate(&img).is_err());
    }
}
