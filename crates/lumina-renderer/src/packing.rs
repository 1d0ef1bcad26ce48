//! Float Packing
//!
//! Fixed-point encodings used to squeeze light properties into 8-bit texels.
//! The GPU decoder applies the exact inverse of these routines, so the byte
//! layouts here are part of the shader contract:
//!
//! - **Linear**: a value in `[min, max]` is quantized to `256^n - 1` steps and
//!   stored most-significant byte first. Both range ends are representable.
//! - **Mantissa/exponent**: `value = mantissa * 2^exponent` with the mantissa
//!   stored linearly in `[-1, 1]` over the leading bytes and `exponent + 127`
//!   in the final byte.
//!
//! Out-of-range inputs are clamped, never rejected.

/// Widest supported linear field in bytes
pub const MAX_PACKED_BYTES: usize = 4;

/// Exponent bias of the mantissa/exponent encoding
pub const EXPONENT_BIAS: i32 = 127;

fn max_steps(byte_count: usize) -> u64 {
    debug_assert!((1..=MAX_PACKED_BYTES).contains(&byte_count));
    (1u64 << (8 * byte_count)) - 1
}

/// Quantization step of a linear field, in units of the value range
pub fn linear_step(byte_count: usize, min: f32, max: f32) -> f32 {
    ((max - min) as f64 / max_steps(byte_count) as f64) as f32
}

/// Packs `value` from `[min, max]` into all of `out` (1 to 4 bytes), MSB first
pub fn pack_linear(value: f32, out: &mut [u8], min: f32, max: f32) {
    let byte_count = out.len();
    let (value, min, max) = (value as f64, min as f64, max as f64);
    let normalized = if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        0.0
    };
    // NaN survives clamp
    let normalized = if normalized.is_nan() { 0.0 } else { normalized };

    let quantized = (normalized * max_steps(byte_count) as f64).round() as u64;
    for (i, byte) in out.iter_mut().enumerate() {
        let shift = 8 * (byte_count - 1 - i);
        *byte = (quantized >> shift) as u8;
    }
}

/// Packs a value from `[0, 1]` into `out`
pub fn pack_unit(value: f32, out: &mut [u8]) {
    pack_linear(value, out, 0.0, 1.0);
}

/// Inverse of [`pack_linear`]
pub fn unpack_linear(bytes: &[u8], min: f32, max: f32) -> f32 {
    let quantized = bytes.iter().fold(0u64, |acc, &byte| (acc << 8) | byte as u64);
    let normalized = quantized as f64 / max_steps(bytes.len()) as f64;
    (min as f64 + normalized * (max - min) as f64) as f32
}

/// Inverse of [`pack_unit`]
pub fn unpack_unit(bytes: &[u8]) -> f32 {
    unpack_linear(bytes, 0.0, 1.0)
}

/// Packs a float of any magnitude into `out` (2 to 4 bytes) as mantissa and exponent
pub fn pack_mantissa_exponent(value: f32, out: &mut [u8]) {
    let byte_count = out.len();
    debug_assert!((2..=MAX_PACKED_BYTES).contains(&byte_count));
    let (mantissa_bytes, exponent_byte) = out.split_at_mut(byte_count - 1);

    if value == 0.0 || value.is_nan() {
        pack_linear(0.0, mantissa_bytes, -1.0, 1.0);
        exponent_byte[0] = 0;
        return;
    }
    if value.is_infinite() {
        pack_linear(value.signum(), mantissa_bytes, -1.0, 1.0);
        exponent_byte[0] = u8::MAX;
        return;
    }

    // One above floor(log2) so the mantissa magnitude stays below one
    let value = value as f64;
    let exponent = (value.abs().log2().floor() as i32 + 1).clamp(-EXPONENT_BIAS, 255 - EXPONENT_BIAS);
    let mantissa = value / 2f64.powi(exponent);

    pack_linear(mantissa as f32, mantissa_bytes, -1.0, 1.0);
    exponent_byte[0] = (exponent + EXPONENT_BIAS) as u8;
}

/// Inverse of [`pack_mantissa_exponent`]
pub fn unpack_mantissa_exponent(bytes: &[u8]) -> f32 {
    let (mantissa_bytes, exponent_byte) = bytes.split_at(bytes.len() - 1);
    let mantissa = unpack_linear(mantissa_bytes, -1.0, 1.0) as f64;
    let exponent = exponent_byte[0] as i32 - EXPONENT_BIAS;
    (mantissa * 2f64.powi(exponent)) as f32
}

/// Converts a unit value to a single byte the way texture normalization expects
pub fn unit_to_byte(value: f32) -> u8 {
    let mut byte = [0u8; 1];
    pack_unit(value, &mut byte);
    byte[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_range_ends() {
        let mut bytes = [0u8; 4];
        pack_unit(0.0, &mut bytes);
        assert_eq!(bytes, [0, 0, 0, 0]);

        pack_unit(1.0, &mut bytes);
        assert_eq!(bytes, [255, 255, 255, 255]);
        assert_eq!(unpack_unit(&bytes), 1.0);
    }

    #[test]
    fn test_linear_msb_first() {
        let mut bytes = [0u8; 2];
        pack_unit(0.5, &mut bytes);
        assert_eq!(bytes, [0x80, 0x00]);

        pack_unit(1.0 / 65535.0, &mut bytes);
        assert_eq!(bytes, [0x00, 0x01]);
    }

    #[test]
    fn test_linear_clamps() {
        let mut bytes = [0u8; 2];
        pack_linear(25.0, &mut bytes, -1.0, 20.0);
        assert_eq!(bytes, [255, 255]);

        pack_linear(-3.0, &mut bytes, -1.0, 20.0);
        assert_eq!(bytes, [0, 0]);

        pack_unit(f32::NAN, &mut bytes);
        assert_eq!(bytes, [0, 0]);
    }

    #[test]
    fn test_linear_round_trip_within_step() {
        for byte_count in 1..=MAX_PACKED_BYTES {
            let step = linear_step(byte_count, -1.0, 20.0);
            for value in [-1.0, -0.37, 0.0, 0.001, 3.5, 12.25, 19.99, 20.0] {
                let mut bytes = [0u8; MAX_PACKED_BYTES];
                pack_linear(value, &mut bytes[..byte_count], -1.0, 20.0);
                let decoded = unpack_linear(&bytes[..byte_count], -1.0, 20.0);
                assert!(
                    (decoded - value).abs() <= step * 0.5 + 1e-6,
                    "{byte_count} bytes: {value} decoded as {decoded}"
                );
            }
        }
    }

    #[test]
    fn test_mantissa_exponent_round_trip() {
        for value in [1.0, -1.0, 0.5, 3.75, -1234.5678, 1.0e-6, 6.02e23, -2.0e-30, 4096.0] {
            let mut bytes = [0u8; 4];
            pack_mantissa_exponent(value, &mut bytes);
            let decoded = unpack_mantissa_exponent(&bytes);
            let relative = ((decoded - value) / value).abs();
            assert!(relative < 1.0e-6, "{value} decoded as {decoded}");
        }
    }

    #[test]
    fn test_mantissa_exponent_zero() {
        let mut bytes = [0u8; 4];
        pack_mantissa_exponent(0.0, &mut bytes);
        assert_eq!(bytes[3], 0);
        assert!(unpack_mantissa_exponent(&bytes).abs() < 1.0e-30);
    }

    #[test]
    fn test_mantissa_exponent_layout() {
        // 3.0 = 0.75 * 2^2
        let mut bytes = [0u8; 4];
        pack_mantissa_exponent(3.0, &mut bytes);
        assert_eq!(bytes[3], 129);
        assert!((unpack_linear(&bytes[..3], -1.0, 1.0) - 0.75).abs() < 1.0e-6);
    }

    #[test]
    fn test_unit_to_byte() {
        assert_eq!(unit_to_byte(0.0), 0);
        assert_eq!(unit_to_byte(1.0), 255);
        assert_eq!(unit_to_byte(2.0), 255);
        assert_eq!(unit_to_byte(0.5), 128);
    }
}
