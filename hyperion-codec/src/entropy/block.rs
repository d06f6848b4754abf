// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Block-adaptive coding in the Rice family.
//!
//! The residual stream is cut into fixed-size blocks and every block is coded with the option
//! that minimizes its length: no-compression, fundamental-sequence, one of the k-split codes,
//! the second-extension pair code, or a run of all-zero blocks. Every J-th block is a reference
//! block whose first residual travels verbatim. The decoder re-derives block boundaries and
//! reference positions from the cube volume in the header, so the option identifier is the only
//! per-block overhead.

use std::io;
use std::mem;

use hyperion_core::errors::{overflow_error, Result};
use hyperion_core::io::{BitReaderLtr, BitWriterLtr};
use hyperion_core::meta::{BlockAdaptiveParams, ImageParams};

/// Longest run of all-zero blocks a single zero-block codeword may cover.
const MAX_ZERO_RUN: u32 = 64;

/// Width of the code-option identifier for dynamic range `d`.
fn id_len(d: u32) -> u32 {
    if d <= 8 {
        3
    }
    else {
        4
    }
}

/// The diagonal pairing index of the second-extension option.
fn pair_index(a: u64, b: u64) -> u64 {
    let sum = a + b;
    sum * (sum + 1) / 2 + b
}

/// Inverse of [`pair_index`].
fn pair_split(gamma: u64) -> (u64, u64) {
    let mut m = 0u64;
    while (m + 1) * (m + 2) / 2 <= gamma {
        m += 1;
    }
    let b = gamma - m * (m + 1) / 2;
    (m - b, b)
}

/// The block coding option selected for one block, in identifier order.
enum Choice {
    /// Second-extension pair code.
    Ext2,
    /// k-split; k = 0 is the fundamental sequence.
    Split(u32),
    /// Verbatim D-bit residuals.
    NoComp,
}

pub struct BlockAdaptiveEncoder {
    dyn_range: u32,
    id_len: u32,
    block_size: usize,
    ref_interval: u64,
    block: Vec<u16>,
    block_index: u64,
    zero_run: u32,
}

impl BlockAdaptiveEncoder {
    pub fn new(image: &ImageParams, params: &BlockAdaptiveParams) -> BlockAdaptiveEncoder {
        BlockAdaptiveEncoder {
            dyn_range: image.dyn_range,
            id_len: id_len(image.dyn_range),
            block_size: params.block_size as usize,
            ref_interval: u64::from(params.reference_interval),
            block: Vec::with_capacity(params.block_size as usize),
            block_index: 0,
            zero_run: 0,
        }
    }

    pub fn encode<W: io::Write>(
        &mut self,
        bw: &mut BitWriterLtr<W>,
        delta: u16,
    ) -> Result<()> {
        self.block.push(delta);
        if self.block.len() == self.block_size {
            self.flush_block(bw)?;
        }
        Ok(())
    }

    /// Flushes the pending partial block and any outstanding zero run.
    pub fn finish<W: io::Write>(&mut self, bw: &mut BitWriterLtr<W>) -> Result<()> {
        if !self.block.is_empty() {
            self.flush_block(bw)?;
        }
        self.flush_zero_run(bw)
    }

    fn flush_block<W: io::Write>(&mut self, bw: &mut BitWriterLtr<W>) -> Result<()> {
        let mut block = mem::take(&mut self.block);

        let is_ref = self.block_index % self.ref_interval == 0;
        self.block_index += 1;

        if is_ref {
            // A zero run never crosses a reference block.
            self.flush_zero_run(bw)?;
            bw.write_bits(u64::from(block[0]), self.dyn_range)?;
            if block.len() > 1 {
                self.code_block(bw, &block[1..])?;
            }
        }
        else if block.len() == self.block_size && block.iter().all(|&v| v == 0) {
            self.zero_run += 1;
            if self.zero_run == MAX_ZERO_RUN {
                self.flush_zero_run(bw)?;
            }
        }
        else {
            self.flush_zero_run(bw)?;
            self.code_block(bw, &block)?;
        }

        block.clear();
        self.block = block;
        Ok(())
    }

    fn flush_zero_run<W: io::Write>(&mut self, bw: &mut BitWriterLtr<W>) -> Result<()> {
        if self.zero_run > 0 {
            bw.write_bits(0, self.id_len)?;
            bw.write_bit(false)?;
            bw.write_unary_zeros(self.zero_run - 1)?;
            self.zero_run = 0;
        }
        Ok(())
    }

    /// Codes one block with the cheapest option. Ties break toward the lowest identifier.
    fn code_block<W: io::Write>(
        &mut self,
        bw: &mut BitWriterLtr<W>,
        symbols: &[u16],
    ) -> Result<()> {
        let d = u64::from(self.dyn_range);
        let id_bits = u64::from(self.id_len);
        let n = symbols.len() as u64;

        let mut candidates: Vec<(u64, Choice)> = Vec::new();

        // The pair code needs an even symbol count.
        if n % 2 == 0 {
            let mut len = id_bits + 1;
            for pair in symbols.chunks(2) {
                len += pair_index(u64::from(pair[0]), u64::from(pair[1])) + 1;
            }
            candidates.push((len, Choice::Ext2));
        }

        let k_max = (self.dyn_range - 2).min((1 << self.id_len) - 3);
        for k in 0..=k_max {
            let len = id_bits
                + symbols
                    .iter()
                    .map(|&s| u64::from(s >> k) + 1 + u64::from(k))
                    .sum::<u64>();
            candidates.push((len, Choice::Split(k)));
        }

        candidates.push((id_bits + n * d, Choice::NoComp));

        // min_by_key keeps the first minimum, and candidates are pushed in identifier order.
        let (_, choice) = candidates.iter().min_by_key(|&&(len, _)| len).unwrap();

        match *choice {
            Choice::Ext2 => {
                bw.write_bits(0, self.id_len)?;
                bw.write_bit(true)?;
                for pair in symbols.chunks(2) {
                    let gamma = pair_index(u64::from(pair[0]), u64::from(pair[1]));
                    // A selected pair code is shorter than no-compression, so gamma is small.
                    bw.write_unary_zeros(gamma as u32)?;
                }
            }
            Choice::Split(k) => {
                bw.write_bits(u64::from(k) + 1, self.id_len)?;
                for &s in symbols {
                    bw.write_unary_zeros(u32::from(s >> k))?;
                    bw.write_bits(u64::from(s), k)?;
                }
            }
            Choice::NoComp => {
                bw.write_bits((1 << self.id_len) - 1, self.id_len)?;
                for &s in symbols {
                    bw.write_bits(u64::from(s), self.dyn_range)?;
                }
            }
        }

        Ok(())
    }
}

pub struct BlockAdaptiveDecoder {
    dyn_range: u32,
    id_len: u32,
    block_size: usize,
    ref_interval: u64,
    /// Symbols not yet delivered out of the stream.
    symbols_left: u64,
    block_index: u64,
    /// Blocks remaining in the zero run being expanded.
    zero_blocks: u32,
    pending: Vec<u16>,
    pos: usize,
}

impl BlockAdaptiveDecoder {
    pub fn new(
        image: &ImageParams,
        params: &BlockAdaptiveParams,
        total_symbols: u64,
    ) -> BlockAdaptiveDecoder {
        BlockAdaptiveDecoder {
            dyn_range: image.dyn_range,
            id_len: id_len(image.dyn_range),
            block_size: params.block_size as usize,
            ref_interval: u64::from(params.reference_interval),
            symbols_left: total_symbols,
            block_index: 0,
            zero_blocks: 0,
            pending: Vec::with_capacity(params.block_size as usize),
            pos: 0,
        }
    }

    pub fn decode(&mut self, br: &mut BitReaderLtr<'_>) -> Result<u16> {
        if self.pos == self.pending.len() {
            self.refill(br)?;
        }
        let value = self.pending[self.pos];
        self.pos += 1;
        Ok(value)
    }

    /// Decodes the next block into the pending buffer.
    fn refill(&mut self, br: &mut BitReaderLtr<'_>) -> Result<()> {
        debug_assert!(self.symbols_left > 0);

        self.pending.clear();
        self.pos = 0;

        let len = self.symbols_left.min(self.block_size as u64) as usize;

        if self.zero_blocks > 0 {
            // Runs only ever cover full non-reference blocks.
            self.zero_blocks -= 1;
            self.pending.resize(self.block_size, 0);
        }
        else if self.block_index % self.ref_interval == 0 {
            let first = br.read_bits_leq32(self.dyn_range)? as u16;
            self.pending.push(first);
            if len > 1 {
                self.read_coded(br, len - 1, false)?;
            }
        }
        else if self.read_coded(br, len, true)? {
            // This block opens a zero run.
            self.zero_blocks -= 1;
            self.pending.resize(self.block_size, 0);
        }

        self.block_index += 1;
        self.symbols_left -= self.pending.len() as u64;
        Ok(())
    }

    /// Reads one coded block body of `n` symbols into the pending buffer. Returns true when a
    /// zero-block run was signalled instead; `self.zero_blocks` then counts the whole run.
    fn read_coded(
        &mut self,
        br: &mut BitReaderLtr<'_>,
        n: usize,
        allow_zero_run: bool,
    ) -> Result<bool> {
        let id = br.read_bits_leq32(self.id_len)?;
        let all_ones = (1u32 << self.id_len) - 1;
        let mask = (1u64 << self.dyn_range) - 1;

        if id == 0 {
            if !br.read_bit()? {
                if !allow_zero_run {
                    return overflow_error("zero-block run inside a reference block");
                }

                let run = br.read_unary_zeros()? + 1;
                if run > MAX_ZERO_RUN {
                    return overflow_error("zero-block run is too long");
                }
                if u64::from(run) * self.block_size as u64 > self.symbols_left {
                    return overflow_error("zero-block run exceeds the stream");
                }
                for i in 1..u64::from(run) {
                    if (self.block_index + i) % self.ref_interval == 0 {
                        return overflow_error("zero-block run crosses a reference block");
                    }
                }

                self.zero_blocks = run;
                return Ok(true);
            }

            // Second extension.
            if n % 2 != 0 {
                return overflow_error("pair code on an odd-length block");
            }
            for _ in 0..n / 2 {
                let gamma = u64::from(br.read_unary_zeros()?);
                let (a, b) = pair_split(gamma);
                if a > mask || b > mask {
                    return overflow_error("decoded residual exceeds the dynamic range");
                }
                self.pending.push(a as u16);
                self.pending.push(b as u16);
            }
        }
        else if id == all_ones {
            for _ in 0..n {
                self.pending.push(br.read_bits_leq32(self.dyn_range)? as u16);
            }
        }
        else {
            let k = id - 1;
            if k > (self.dyn_range - 2).min(all_ones - 2) {
                return overflow_error("split parameter out of range");
            }
            for _ in 0..n {
                let quotient = br.read_unary_zeros()?;
                let value =
                    (u64::from(quotient) << k) | u64::from(br.read_bits_leq32(k)?);
                if value > mask {
                    return overflow_error("decoded residual exceeds the dynamic range");
                }
                self.pending.push(value as u16);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::{pair_index, pair_split, BlockAdaptiveDecoder, BlockAdaptiveEncoder};
    use hyperion_core::io::{BitReaderLtr, BitWriterLtr};
    use hyperion_core::meta::{BlockAdaptiveParams, ByteOrder, ImageParams};
    use hyperion_core::scan::Interleaving;

    fn image(dyn_range: u32) -> ImageParams {
        ImageParams {
            x_size: 8,
            y_size: 8,
            z_size: 1,
            dyn_range,
            signed: false,
            interleaving: Interleaving::Bsq,
            interleaving_depth: 0,
            byte_order: ByteOrder::Little,
            user_data: 0,
        }
    }

    fn round_trip(dyn_range: u32, params: &BlockAdaptiveParams, residuals: &[u16]) -> Vec<u8> {
        let img = image(dyn_range);

        let mut buf = Vec::new();
        {
            let mut bw = BitWriterLtr::new(&mut buf);
            let mut enc = BlockAdaptiveEncoder::new(&img, params);
            for &delta in residuals {
                enc.encode(&mut bw, delta).unwrap();
            }
            enc.finish(&mut bw).unwrap();
            bw.align().unwrap();
        }

        let mut br = BitReaderLtr::new(&buf);
        let mut dec = BlockAdaptiveDecoder::new(&img, params, residuals.len() as u64);
        for &delta in residuals {
            assert_eq!(dec.decode(&mut br).unwrap(), delta);
        }

        buf
    }

    #[test]
    fn verify_pairing_inverse() {
        for a in [0u64, 1, 2, 7, 100, 65535] {
            for b in [0u64, 1, 3, 99, 65535] {
                assert_eq!(pair_split(pair_index(a, b)), (a, b));
            }
        }
    }

    #[test]
    fn verify_round_trip_every_block_size() {
        let residuals: Vec<u16> = (0..160u32).map(|i| (i * 7 % 1024) as u16).collect();

        for block_size in [8, 16, 32, 64] {
            round_trip(
                12,
                &BlockAdaptiveParams { block_size, reference_interval: 4 },
                &residuals,
            );
        }
    }

    #[test]
    fn verify_round_trip_partial_final_block() {
        // 100 symbols leave a 4-symbol final block at block size 32.
        let residuals: Vec<u16> = (0..100u32).map(|i| (i % 97) as u16).collect();
        round_trip(8, &BlockAdaptiveParams { block_size: 32, reference_interval: 2 }, &residuals);
    }

    #[test]
    fn verify_round_trip_reference_intervals() {
        let residuals: Vec<u16> = (0..128u32).map(|i| (i % 13) as u16).collect();

        // An interval that divides the block count, and one that does not.
        for reference_interval in [1, 2, 3, 4096] {
            round_trip(
                8,
                &BlockAdaptiveParams { block_size: 8, reference_interval },
                &residuals,
            );
        }
    }

    #[test]
    fn verify_zero_blocks_use_run_codes() {
        // 8 blocks of zeros between two data blocks, no reference in between.
        let mut residuals = vec![1u16; 8];
        residuals.extend_from_slice(&[0; 64]);
        residuals.extend_from_slice(&[5; 8]);

        let stream = round_trip(
            8,
            &BlockAdaptiveParams { block_size: 8, reference_interval: 4096 },
            &residuals,
        );

        // Block 0 is the lone reference block: its first residual verbatim (0x01), then the
        // seven remaining ones as a fundamental sequence (id 001, seven 01 codewords). The
        // eight all-zero blocks collapse to a single zero-run codeword: the all-zeros id, the
        // zero-block selector bit, and unary(7), i.e. 000 0 00000001. The final block takes
        // the k = 1 split (id 010, eight 0011 codewords).
        assert_eq!(
            stream,
            &[0x01, 0x2a, 0xaa, 0x80, 0x0a, 0x33, 0x33, 0x33, 0x33]
        );
    }

    #[test]
    fn verify_long_zero_run_splits() {
        // More than 64 consecutive zero blocks forces a second run codeword.
        let residuals = vec![0u16; 8 * 70];
        round_trip(8, &BlockAdaptiveParams { block_size: 8, reference_interval: 4096 }, &residuals);
    }

    #[test]
    fn verify_all_extremes_pick_no_compression() {
        // Incompressible noise at full amplitude still round-trips.
        let residuals: Vec<u16> =
            (0..64u32).map(|i| if i % 2 == 0 { 0xffff } else { 0 }).collect();
        round_trip(16, &BlockAdaptiveParams { block_size: 16, reference_interval: 2 }, &residuals);
    }
}
