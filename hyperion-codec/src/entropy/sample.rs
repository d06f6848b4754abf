// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sample-adaptive Golomb-power-of-two coding.
//!
//! Every band carries a running counter and accumulator from which the Golomb parameter k is
//! rederived before each codeword. Encoder and decoder evolve the same statistics from the same
//! decoded values, so the parameter sequence never needs to be transmitted. The first residual
//! of each band is sent verbatim and leaves the statistics untouched.

use std::io;

use hyperion_core::errors::{overflow_error, Result};
use hyperion_core::io::{BitReaderLtr, BitWriterLtr};
use hyperion_core::meta::{ImageParams, SampleAdaptiveParams};

struct BandStats {
    counter: u64,
    accumulator: u64,
    started: bool,
}

/// Shared state machine of the sample-adaptive coder and decoder.
pub struct SampleAdaptive {
    dyn_range: u32,
    unary_limit: u32,
    /// Counter value that triggers a rescale, 2^y*.
    rescale_at: u64,
    bands: Vec<BandStats>,
}

impl SampleAdaptive {
    pub fn new(image: &ImageParams, params: &SampleAdaptiveParams) -> SampleAdaptive {
        let counter = 1u64 << (params.initial_count_exponent - 1);

        let bands = (0..image.z_size)
            .map(|z| {
                let k = u64::from(params.accumulator.for_band(z));
                BandStats {
                    counter,
                    accumulator: (counter * (3 * (1 << (k + 6)) - 49)) >> 7,
                    started: false,
                }
            })
            .collect();

        SampleAdaptive {
            dyn_range: image.dyn_range,
            unary_limit: params.unary_limit,
            rescale_at: 1u64 << params.rescale_counter_size,
            bands,
        }
    }

    /// The Golomb parameter for the next residual of band `z`, clipped to D - 2.
    fn k_for(&self, z: usize) -> u32 {
        let stats = &self.bands[z];
        let biased = stats.accumulator + ((49 * stats.counter) >> 7);

        let quotient = biased / stats.counter;
        if quotient == 0 {
            0
        }
        else {
            quotient.ilog2().min(self.dyn_range - 2)
        }
    }

    fn update(&mut self, z: usize, delta: u64) {
        let stats = &mut self.bands[z];

        stats.accumulator += delta;
        stats.counter += 1;

        if stats.counter == self.rescale_at {
            stats.accumulator = (stats.accumulator + 1) >> 1;
            stats.counter = (stats.counter + 1) >> 1;
        }
    }

    pub fn encode<W: io::Write>(
        &mut self,
        bw: &mut BitWriterLtr<W>,
        z: usize,
        delta: u16,
    ) -> Result<()> {
        if !self.bands[z].started {
            self.bands[z].started = true;
            return bw.write_bits(u64::from(delta), self.dyn_range);
        }

        let k = self.k_for(z);
        let quotient = u32::from(delta) >> k;

        if quotient < self.unary_limit {
            bw.write_unary_zeros(quotient)?;
            bw.write_bits(u64::from(delta), k)?;
        }
        else {
            // The escape: the longest possible run of zeros, then the residual verbatim. No
            // terminating one bit.
            bw.write_bits(0, self.unary_limit)?;
            bw.write_bits(u64::from(delta), self.dyn_range)?;
        }

        self.update(z, u64::from(delta));
        Ok(())
    }

    pub fn decode(&mut self, br: &mut BitReaderLtr<'_>, z: usize) -> Result<u16> {
        if !self.bands[z].started {
            self.bands[z].started = true;
            return Ok(br.read_bits_leq32(self.dyn_range)? as u16);
        }

        let k = self.k_for(z);

        let delta = match br.read_unary_zeros_capped(self.unary_limit)? {
            Some(quotient) => (quotient << k) | br.read_bits_leq32(k)?,
            None => br.read_bits_leq32(self.dyn_range)?,
        };

        if delta >= 1 << self.dyn_range {
            return overflow_error("decoded residual exceeds the dynamic range");
        }

        self.update(z, u64::from(delta));
        Ok(delta as u16)
    }
}
