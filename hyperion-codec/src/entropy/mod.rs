// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `entropy` module turns mapped residuals into payload codewords and back.
//!
//! The two coding strategies are distinct state machines over the same residual stream. They
//! are selected once, from the configuration on the way in and from the parsed header on the
//! way out, and dispatched as a tagged variant thereafter.

pub mod block;
pub mod sample;

use std::io;

use hyperion_core::errors::Result;
use hyperion_core::io::{BitReaderLtr, BitWriterLtr};
use hyperion_core::meta::{EncoderParams, EncodingMethod, ImageParams};

use block::{BlockAdaptiveDecoder, BlockAdaptiveEncoder};
use sample::SampleAdaptive;

/// The encode-side residual coder.
pub(crate) enum ResidualEncoder {
    Sample(SampleAdaptive),
    Block(BlockAdaptiveEncoder),
}

impl ResidualEncoder {
    pub(crate) fn new(image: &ImageParams, params: &EncoderParams) -> ResidualEncoder {
        match params.method {
            EncodingMethod::SampleAdaptive(ref sa) => {
                ResidualEncoder::Sample(SampleAdaptive::new(image, sa))
            }
            EncodingMethod::BlockAdaptive(ref ba) => {
                ResidualEncoder::Block(BlockAdaptiveEncoder::new(image, ba))
            }
        }
    }

    /// Encodes one residual arriving at band `z` of the output scan.
    pub(crate) fn encode_one<W: io::Write>(
        &mut self,
        bw: &mut BitWriterLtr<W>,
        z: usize,
        delta: u16,
    ) -> Result<()> {
        match *self {
            ResidualEncoder::Sample(ref mut coder) => coder.encode(bw, z, delta),
            ResidualEncoder::Block(ref mut coder) => coder.encode(bw, delta),
        }
    }

    /// Flushes whatever the strategy still holds back.
    pub(crate) fn finish<W: io::Write>(&mut self, bw: &mut BitWriterLtr<W>) -> Result<()> {
        match *self {
            ResidualEncoder::Sample(_) => Ok(()),
            ResidualEncoder::Block(ref mut coder) => coder.finish(bw),
        }
    }
}

/// The decode-side residual coder.
pub(crate) enum ResidualDecoder {
    Sample(SampleAdaptive),
    Block(BlockAdaptiveDecoder),
}

impl ResidualDecoder {
    pub(crate) fn new(
        image: &ImageParams,
        params: &EncoderParams,
        total_symbols: u64,
    ) -> ResidualDecoder {
        match params.method {
            EncodingMethod::SampleAdaptive(ref sa) => {
                ResidualDecoder::Sample(SampleAdaptive::new(image, sa))
            }
            EncodingMethod::BlockAdaptive(ref ba) => {
                ResidualDecoder::Block(BlockAdaptiveDecoder::new(image, ba, total_symbols))
            }
        }
    }

    /// Decodes the next residual of the output scan, arriving at band `z`.
    pub(crate) fn decode_one(
        &mut self,
        br: &mut BitReaderLtr<'_>,
        z: usize,
    ) -> Result<u16> {
        match *self {
            ResidualDecoder::Sample(ref mut coder) => coder.decode(br, z),
            ResidualDecoder::Block(ref mut coder) => coder.decode(br),
        }
    }
}
