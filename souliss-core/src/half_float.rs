//! IEEE-754 binary16 conversion for sensor and setpoint values (two bytes, little-endian on the
//! wire).

/// Decode two little-endian bytes into an `f32`.
pub fn decode(lo: u8, hi: u8) -> f32 {
    to_f32(u16::from_le_bytes([lo, hi]))
}

/// Encode an `f32` into two little-endian bytes.
pub fn encode(value: f32) -> [u8; 2] {
    from_f32(value).to_le_bytes()
}

/// binary16 bits to `f32`.
pub fn to_f32(bits: u16) -> f32 {
    let sign = u32::from(bits >> 15) << 31;
    let exponent = u32::from((bits >> 10) & 0x1F);
    let mantissa = u32::from(bits & 0x3FF);
    let out = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, m) => {
            // Subnormal: normalise the mantissa.
            let mut e: i32 = -14;
            let mut m = m;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            let m = m & 0x3FF;
            sign | (((e + 127) as u32) << 23) | (m << 13)
        }
        (0x1F, 0) => sign | 0x7F80_0000,
        (0x1F, m) => sign | 0x7F80_0000 | (m << 13),
        (e, m) => sign | ((e + 127 - 15) << 23) | (m << 13),
    };
    f32::from_bits(out)
}

/// `f32` to binary16 bits, rounding to nearest even.
pub fn from_f32(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x7F_FFFF;

    if exponent == 0xFF {
        let nan = if mantissa != 0 { 0x200 } else { 0 };
        return sign | 0x7C00 | nan;
    }
    let half_exp = exponent - 127 + 15;
    if half_exp >= 0x1F {
        return sign | 0x7C00;
    }
    if half_exp <= 0 {
        if half_exp < -10 {
            return sign;
        }
        let m = mantissa | 0x80_0000;
        let shift = (14 - half_exp) as u32;
        let half_m = m >> shift;
        let round = (m >> (shift - 1)) & 1;
        let sticky = m & ((1 << (shift - 1)) - 1);
        let rounded = half_m + (round & (u32::from(sticky != 0) | (half_m & 1)));
        return sign | rounded as u16;
    }
    let half_m = mantissa >> 13;
    let round = (mantissa >> 12) & 1;
    let sticky = mantissa & 0xFFF;
    let base = ((half_exp as u32) << 10) | half_m;
    let rounded = base + (round & (u32::from(sticky != 0) | (half_m & 1)));
    sign | rounded as u16
}
