// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `header` module packs and parses the fixed-layout metadata preceding the payload.
//!
//! The header is three byte-aligned blocks: image, predictor, and encoder metadata, with the
//! optional weight and accumulator initialization tables trailing their blocks. Field widths
//! follow the standard's header tables; values that fill their field (a dynamic range of 16, a
//! register size of 64, a word size of 8, a reference interval of 4096) wrap to zero on the
//! wire. Every parsed field is range-checked before the configuration is handed back.

use std::io;

use log::debug;

use hyperion_core::errors::{corrupt_error, Error, Result};
use hyperion_core::io::{BitReaderLtr, BitWriterLtr};
use hyperion_core::meta::{
    validate_config, AccumulatorInit, BlockAdaptiveParams, ByteOrder, EncoderParams,
    EncodingMethod, ImageParams, NeighborSum, PredictorParams, SampleAdaptiveParams, WeightInit,
};
use hyperion_core::scan::Interleaving;
use hyperion_core::util::bits::sign_extend_leq32_to_i32;

fn interleaving_code(interleaving: Interleaving) -> u64 {
    match interleaving {
        Interleaving::Bsq => 0,
        Interleaving::Bip => 1,
        Interleaving::Bil => 2,
    }
}

fn interleaving_from(code: u32) -> Result<Interleaving> {
    match code {
        0 => Ok(Interleaving::Bsq),
        1 => Ok(Interleaving::Bip),
        2 => Ok(Interleaving::Bil),
        _ => corrupt_error("unknown interleaving order"),
    }
}

/// Writes the full header. The writer is byte-aligned on return.
pub fn write_header<W: io::Write>(
    bw: &mut BitWriterLtr<W>,
    image: &ImageParams,
    predictor: &PredictorParams,
    encoder: &EncoderParams,
) -> Result<()> {
    // Image metadata.
    bw.write_bits(u64::from(image.user_data), 8)?;
    bw.write_bits(u64::from(image.x_size), 16)?;
    bw.write_bits(u64::from(image.y_size), 16)?;
    bw.write_bits(u64::from(image.z_size), 16)?;
    bw.write_bit(image.signed)?;
    bw.write_bit(image.byte_order == ByteOrder::Big)?;
    bw.write_bits(u64::from(image.dyn_range) & 0xf, 4)?;
    bw.write_bits(interleaving_code(image.interleaving), 2)?;
    let in_depth =
        if image.interleaving == Interleaving::Bil { image.interleaving_depth } else { 0 };
    bw.write_bits(u64::from(in_depth), 16)?;

    // Predictor metadata.
    bw.write_bits(0, 2)?;
    bw.write_bits(u64::from(predictor.bands), 4)?;
    bw.write_bit(predictor.full)?;
    bw.write_bits(0, 1)?;
    bw.write_bit(predictor.neighbor_sum == NeighborSum::Narrow)?;
    bw.write_bits(0, 1)?;
    bw.write_bits(u64::from(predictor.register_size) & 0x3f, 6)?;
    bw.write_bits(u64::from(predictor.weight_resolution - 4), 4)?;
    bw.write_bits(u64::from(predictor.weight_interval.trailing_zeros() - 4), 4)?;
    bw.write_bits((predictor.weight_initial + 6) as u64, 4)?;
    bw.write_bits((predictor.weight_final + 6) as u64, 4)?;
    bw.write_bits(0, 1)?;

    match predictor.weight_init {
        Some(ref init) => {
            bw.write_bit(true)?;
            bw.write_bit(true)?;
            bw.write_bits(u64::from(init.resolution), 5)?;

            let mask = (1u64 << init.resolution) - 1;
            for row in &init.table {
                for &weight in row {
                    bw.write_bits(weight as u64 & mask, init.resolution)?;
                }
            }
            bw.align()?;
        }
        None => {
            bw.write_bit(false)?;
            bw.write_bit(false)?;
            bw.write_bits(0, 5)?;
        }
    }

    // Encoder metadata.
    let method_bit = matches!(encoder.method, EncodingMethod::BlockAdaptive(_));
    bw.write_bit(method_bit)?;
    bw.write_bits(interleaving_code(encoder.interleaving), 2)?;
    let out_depth =
        if encoder.interleaving == Interleaving::Bil { encoder.interleaving_depth } else { 0 };
    bw.write_bits(u64::from(out_depth), 16)?;
    bw.write_bits(u64::from(encoder.word_size) & 0x7, 3)?;

    match encoder.method {
        EncodingMethod::SampleAdaptive(ref sa) => {
            bw.write_bits(u64::from(sa.unary_limit) & 0x1f, 5)?;
            bw.write_bits(u64::from(sa.rescale_counter_size - 4), 3)?;
            bw.write_bits(u64::from(sa.initial_count_exponent) & 0x7, 3)?;

            match sa.accumulator {
                AccumulatorInit::Constant(k) => {
                    bw.write_bit(false)?;
                    bw.write_bits(u64::from(k), 4)?;
                    bw.write_bits(0, 2)?;
                }
                AccumulatorInit::PerBand(ref table) => {
                    bw.write_bit(true)?;
                    bw.write_bits(0, 4)?;
                    bw.write_bits(0, 2)?;
                    for &k in table {
                        bw.write_bits(u64::from(k), 4)?;
                    }
                    bw.align()?;
                }
            }
        }
        EncodingMethod::BlockAdaptive(ref ba) => {
            bw.write_bits(u64::from(ba.block_size.trailing_zeros() - 3), 2)?;
            bw.write_bits(u64::from(ba.reference_interval) & 0xfff, 12)?;
            bw.write_bits(0, 4)?;
        }
    }

    debug!("wrote header, {} bytes", bw.bytes_written());

    Ok(())
}

/// Parses the full header and re-validates the recovered configuration. The reader is
/// byte-aligned on return.
pub fn parse_header(br: &mut BitReaderLtr<'_>) -> Result<(ImageParams, PredictorParams, EncoderParams)> {
    // Image metadata.
    let user_data = br.read_bits_leq32(8)? as u8;
    let x_size = br.read_bits_leq32(16)?;
    let y_size = br.read_bits_leq32(16)?;
    let z_size = br.read_bits_leq32(16)?;

    if x_size == 0 || y_size == 0 || z_size == 0 {
        return corrupt_error("image extent is zero");
    }

    let signed = br.read_bit()?;
    let byte_order = if br.read_bit()? { ByteOrder::Big } else { ByteOrder::Little };

    let dyn_range = match br.read_bits_leq32(4)? {
        0 => 16,
        1 => return corrupt_error("dynamic range below 2 bits"),
        raw => raw,
    };

    let interleaving = interleaving_from(br.read_bits_leq32(2)?)?;
    let interleaving_depth = br.read_bits_leq32(16)?;

    let image = ImageParams {
        x_size,
        y_size,
        z_size,
        dyn_range,
        signed,
        interleaving,
        interleaving_depth,
        byte_order,
        user_data,
    };

    // Predictor metadata.
    br.ignore_bits(2)?;
    let bands = br.read_bits_leq32(4)?;
    let full = br.read_bit()?;
    br.ignore_bits(1)?;
    let neighbor_sum = if br.read_bit()? { NeighborSum::Narrow } else { NeighborSum::Wide };
    br.ignore_bits(1)?;

    let register_size = match br.read_bits_leq32(6)? {
        0 => 64,
        raw if raw < 32 => return corrupt_error("register size below 32 bits"),
        raw => raw,
    };

    let weight_resolution = br.read_bits_leq32(4)? + 4;

    let interval_exp = br.read_bits_leq32(4)?;
    if interval_exp > 7 {
        return corrupt_error("weight interval exponent out of range");
    }
    let weight_interval = 1u32 << (interval_exp + 4);

    let weight_initial = br.read_bits_leq32(4)? as i32 - 6;
    let weight_final = br.read_bits_leq32(4)? as i32 - 6;

    br.ignore_bits(1)?;
    let custom = br.read_bit()?;
    let table_included = br.read_bit()?;
    let resolution = br.read_bits_leq32(5)?;

    if custom != table_included {
        return corrupt_error("inconsistent weight table flags");
    }

    let weight_init = if custom {
        if resolution < 3 || resolution > weight_resolution + 3 {
            return corrupt_error("weight init resolution out of range");
        }

        let components = bands as usize + if full { 3 } else { 0 };
        let mut table = Vec::with_capacity(z_size as usize);
        for _ in 0..z_size {
            let mut row = Vec::with_capacity(components);
            for _ in 0..components {
                let raw = br.read_bits_leq32(resolution)?;
                row.push(sign_extend_leq32_to_i32(raw, resolution));
            }
            table.push(row);
        }
        br.realign();

        Some(WeightInit { resolution, table })
    }
    else {
        None
    };

    let predictor = PredictorParams {
        bands,
        full,
        neighbor_sum,
        register_size,
        weight_resolution,
        weight_interval,
        weight_initial,
        weight_final,
        weight_init,
    };

    // Encoder metadata.
    let method_bit = br.read_bit()?;
    let out_interleaving = interleaving_from(br.read_bits_leq32(2)?)?;
    let out_depth = br.read_bits_leq32(16)?;
    let word_size = match br.read_bits_leq32(3)? {
        0 => 8,
        raw => raw,
    };

    let method = if !method_bit {
        let unary_limit = match br.read_bits_leq32(5)? {
            0 => 32,
            raw => raw,
        };
        let rescale_counter_size = br.read_bits_leq32(3)? + 4;
        let initial_count_exponent = match br.read_bits_leq32(3)? {
            0 => 8,
            raw => raw,
        };
        let k_table = br.read_bit()?;
        let k = br.read_bits_leq32(4)?;
        br.ignore_bits(2)?;

        let accumulator = if k_table {
            let mut table = Vec::with_capacity(z_size as usize);
            for _ in 0..z_size {
                table.push(br.read_bits_leq32(4)?);
            }
            br.realign();
            AccumulatorInit::PerBand(table)
        }
        else {
            AccumulatorInit::Constant(k)
        };

        EncodingMethod::SampleAdaptive(SampleAdaptiveParams {
            initial_count_exponent,
            rescale_counter_size,
            unary_limit,
            accumulator,
        })
    }
    else {
        let block_size = 8u32 << br.read_bits_leq32(2)?;
        let reference_interval = match br.read_bits_leq32(12)? {
            0 => 4096,
            raw => raw,
        };
        br.ignore_bits(4)?;

        EncodingMethod::BlockAdaptive(BlockAdaptiveParams { block_size, reference_interval })
    };

    let encoder = EncoderParams {
        interleaving: out_interleaving,
        interleaving_depth: out_depth,
        word_size,
        method,
    };

    // Anything the field-level checks above let through is caught by the configuration
    // validator; a failure there means the header, not the caller, is at fault.
    validate_config(&image, &predictor, &encoder).map_err(|err| match err {
        Error::ConfigInvalid(msg) => Error::CorruptHeader(msg),
        other => other,
    })?;

    debug!(
        "parsed header: {}x{}x{} at {} bits, {:?} payload order",
        image.x_size, image.y_size, image.z_size, image.dyn_range, encoder.interleaving
    );

    Ok((image, predictor, encoder))
}

#[cfg(test)]
mod tests {
    use super::{parse_header, write_header};
    use hyperion_core::io::{BitReaderLtr, BitWriterLtr};
    use hyperion_core::meta::{
        AccumulatorInit, BlockAdaptiveParams, ByteOrder, EncoderParams, EncodingMethod,
        ImageParams, NeighborSum, PredictorParams, SampleAdaptiveParams, WeightInit,
    };
    use hyperion_core::scan::Interleaving;

    fn image() -> ImageParams {
        ImageParams {
            x_size: 4,
            y_size: 4,
            z_size: 3,
            dyn_range: 8,
            signed: false,
            interleaving: Interleaving::Bsq,
            interleaving_depth: 0,
            byte_order: ByteOrder::Little,
            user_data: 0xab,
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

    fn sample_encoder() -> EncoderParams {
        EncoderParams {
            interleaving: Interleaving::Bsq,
            interleaving_depth: 0,
            word_size: 1,
            method: EncodingMethod::SampleAdaptive(SampleAdaptiveParams {
                initial_count_exponent: 1,
                rescale_counter_size: 4,
                unary_limit: 8,
                accumulator: AccumulatorInit::Constant(2),
            }),
        }
    }

    fn round_trip(img: &ImageParams, pred: &PredictorParams, enc: &EncoderParams) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut bw = BitWriterLtr::new(&mut buf);
            write_header(&mut bw, img, pred, enc).unwrap();
        }

        let mut br = BitReaderLtr::new(&buf);
        let (pi, pp, pe) = parse_header(&mut br).unwrap();
        assert_eq!(&pi, img);
        assert_eq!(&pp, pred);
        assert_eq!(&pe, enc);

        buf
    }

    #[test]
    fn verify_known_layout() {
        let buf = round_trip(&image(), &predictor(), &sample_encoder());

        assert_eq!(
            buf,
            &[
                // Image metadata.
                0xab, 0x00, 0x04, 0x00, 0x04, 0x00, 0x03, 0x20, 0x00, 0x00,
                // Predictor metadata.
                0x08, 0x20, 0xa1, 0x59, 0x00,
                // Encoder metadata.
                0x00, 0x00, 0x05, 0x00, 0x88,
            ]
        );
    }

    #[test]
    fn verify_round_trip_field_extremes() {
        let mut img = image();
        img.dyn_range = 16;
        img.signed = true;
        img.byte_order = ByteOrder::Big;
        img.interleaving = Interleaving::Bil;
        img.interleaving_depth = 2;

        let mut pred = predictor();
        pred.register_size = 64;
        pred.weight_resolution = 19;
        pred.weight_interval = 1 << 11;
        pred.weight_initial = -6;
        pred.weight_final = 9;

        let mut enc = sample_encoder();
        enc.interleaving = Interleaving::Bip;
        enc.word_size = 8;
        enc.method = EncodingMethod::SampleAdaptive(SampleAdaptiveParams {
            initial_count_exponent: 8,
            rescale_counter_size: 9,
            unary_limit: 32,
            accumulator: AccumulatorInit::PerBand(vec![0, 7, 14]),
        });

        round_trip(&img, &pred, &enc);
    }

    #[test]
    fn verify_round_trip_weight_table() {
        let mut pred = predictor();
        pred.full = true;
        pred.weight_init = Some(WeightInit {
            resolution: 7,
            table: vec![vec![-64, 63, 0, 1, -1], vec![5, -6, 7, -8, 9], vec![0; 5]],
        });

        round_trip(&image(), &pred, &sample_encoder());
    }

    #[test]
    fn verify_round_trip_block_encoder() {
        let enc = EncoderParams {
            interleaving: Interleaving::Bsq,
            interleaving_depth: 0,
            word_size: 4,
            method: EncodingMethod::BlockAdaptive(BlockAdaptiveParams {
                block_size: 64,
                reference_interval: 4096,
            }),
        };

        round_trip(&image(), &predictor(), &enc);
    }

    #[test]
    fn verify_truncated_header_is_rejected() {
        let mut buf = Vec::new();
        {
            let mut bw = BitWriterLtr::new(&mut buf);
            write_header(&mut bw, &image(), &predictor(), &sample_encoder()).unwrap();
        }

        let mut br = BitReaderLtr::new(&buf[..7]);
        assert!(parse_header(&mut br).is_err());
    }

    #[test]
    fn verify_corrupt_register_size_is_rejected() {
        let mut buf = Vec::new();
        {
            let mut bw = BitWriterLtr::new(&mut buf);
            write_header(&mut bw, &image(), &predictor(), &sample_encoder()).unwrap();
        }

        // The register size field sits in bits 2..8 of the second predictor byte. Value 1 is
        // below the 32-bit floor.
        buf[11] = 0b0000_0001;

        let mut br = BitReaderLtr::new(&buf);
        assert!(parse_header(&mut br).is_err());
    }
}
