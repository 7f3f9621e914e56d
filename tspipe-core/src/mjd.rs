//! Modified Julian Date (MJD) utilities.
//!
//! DVB service information tables (TDT, TOT, EIT, SDT) carry dates as a
//! 16-bit Modified Julian Date day count, optionally followed by a BCD-coded
//! time of day. The MJD epoch is 1858-11-17.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::error::{Error, Result};

/// Size in bytes of a complete encoded MJD (date + HH:MM:SS).
pub const MJD_SIZE: usize = 5;

/// Minimal size in bytes of an encoded MJD (date only).
pub const MJD_MIN_SIZE: usize = 2;

/// Decode one BCD byte into its two-digit value.
fn decode_bcd(byte: u8) -> Result<u32> {
    let hi = (byte >> 4) as u32;
    let lo = (byte & 0x0F) as u32;
    if hi > 9 || lo > 9 {
        return Err(Error::format(format!("invalid BCD byte 0x{byte:02X}")));
    }
    Ok(hi * 10 + lo)
}

/// Encode a value in 0..=99 as one BCD byte.
fn encode_bcd(value: u32) -> u8 {
    (((value / 10) << 4) | (value % 10)) as u8
}

/// Decode a 2, 4 or 5-byte Modified Julian Date into a UTC timestamp.
///
/// Bytes 0-1 are the big-endian day count since 1858-11-17. Bytes 2-4, when
/// present, are the BCD-coded hour, minute and second (the 4-byte form stops
/// at the minute).
pub fn decode_mjd(data: &[u8]) -> Result<DateTime<Utc>> {
    if !matches!(data.len(), 2 | 4 | 5) {
        return Err(Error::format(format!(
            "MJD field must be 2, 4 or 5 bytes, got {}",
            data.len()
        )));
    }

    let mjd = BigEndian::read_u16(&data[0..2]) as i64;

    // Day count to calendar date, per ETSI EN 300 468 annex C.
    let yp = ((mjd as f64 - 15078.2) / 365.25).floor() as i64;
    let mp = ((mjd as f64 - 14956.1 - (yp as f64 * 365.25).floor()) / 30.6001).floor() as i64;
    let day = mjd - 14956 - (yp as f64 * 365.25).floor() as i64 - (mp as f64 * 30.6001).floor() as i64;
    let k = i64::from(mp == 14 || mp == 15);
    let year = 1900 + yp + k;
    let month = mp - 1 - 12 * k;

    let mut hour = 0;
    let mut minute = 0;
    let mut second = 0;
    if data.len() >= 4 {
        hour = decode_bcd(data[2])?;
        minute = decode_bcd(data[3])?;
    }
    if data.len() == 5 {
        second = decode_bcd(data[4])?;
    }

    Utc.with_ymd_and_hms(year as i32, month as u32, day as u32, hour, minute, second)
        .single()
        .ok_or_else(|| {
            Error::format(format!(
                "MJD {mjd} with time {hour:02}:{minute:02}:{second:02} is not a valid UTC instant"
            ))
        })
}

/// Encode a UTC timestamp as a Modified Julian Date.
///
/// The output length selects the encoding: 2 bytes for date only, 5 bytes for
/// date plus BCD time of day. The 4-byte form is accepted by [`decode_mjd`]
/// but is never produced. Dates before 1900-03-01 cannot be represented.
pub fn encode_mjd(time: &DateTime<Utc>, out: &mut [u8]) -> Result<()> {
    if !matches!(out.len(), MJD_MIN_SIZE | MJD_SIZE) {
        return Err(Error::invalid_param(format!(
            "MJD encoding must be 2 or 5 bytes, got {}",
            out.len()
        )));
    }

    let year = time.year() as i64;
    let month = time.month() as i64;
    let day = time.day() as i64;
    if year < 1900 || (year == 1900 && month < 3) {
        return Err(Error::format(format!(
            "date {} predates the MJD encodable range (1900-03-01)",
            time.format("%Y-%m-%d")
        )));
    }

    let l = i64::from(month == 1 || month == 2);
    let mjd = 14956
        + day
        + (((year - 1900 - l) as f64 * 365.25).floor() as i64)
        + (((month + 1 + 12 * l) as f64 * 30.6001).floor() as i64);
    if mjd > u16::MAX as i64 {
        return Err(Error::format(format!(
            "date {} exceeds the 16-bit MJD day count",
            time.format("%Y-%m-%d")
        )));
    }
    BigEndian::write_u16(&mut out[0..2], mjd as u16);

    if out.len() == MJD_MIN_SIZE {
        if time.hour() != 0 || time.minute() != 0 || time.second() != 0 {
            return Err(Error::format(
                "time of day does not fit in a date-only MJD field",
            ));
        }
    } else {
        out[2] = encode_bcd(time.hour());
        out[3] = encode_bcd(time.minute());
        out[4] = encode_bcd(time.second());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_decode_reference_vector() {
        // ETSI EN 300 468 annex C worked example: 1993-10-13 12:45:00.
        let bytes = [0xC0, 0x79, 0x12, 0x45, 0x00];
        let time = decode_mjd(&bytes).unwrap();
        assert_eq!(time, utc(1993, 10, 13, 12, 45, 0));
    }

    #[test]
    fn test_encode_reference_vector() {
        let mut out = [0u8; 5];
        encode_mjd(&utc(1993, 10, 13, 12, 45, 0), &mut out).unwrap();
        assert_eq!(out, [0xC0, 0x79, 0x12, 0x45, 0x00]);
    }

    #[test]
    fn test_date_only_roundtrip() {
        let date = utc(2024, 2, 29, 0, 0, 0);
        let mut out = [0u8; 2];
        encode_mjd(&date, &mut out).unwrap();
        assert_eq!(decode_mjd(&out).unwrap(), date);
    }

    #[test]
    fn test_four_byte_decode() {
        // Date + HH:MM, no seconds byte.
        let bytes = [0xC0, 0x79, 0x23, 0x59];
        let time = decode_mjd(&bytes).unwrap();
        assert_eq!(time, utc(1993, 10, 13, 23, 59, 0));
    }

    #[test]
    fn test_four_byte_encode_rejected() {
        let mut out = [0u8; 4];
        assert!(encode_mjd(&utc(2000, 1, 1, 0, 0, 0), &mut out).is_err());
    }

    #[test]
    fn test_bad_size() {
        assert!(decode_mjd(&[0xC0]).is_err());
        assert!(decode_mjd(&[0xC0, 0x79, 0x12]).is_err());
        assert!(decode_mjd(&[0xC0, 0x79, 0x12, 0x45, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_bad_bcd() {
        let bytes = [0xC0, 0x79, 0x1A, 0x45, 0x00];
        assert!(decode_mjd(&bytes).is_err());
    }

    #[test]
    fn test_out_of_range_time_of_day() {
        // Valid BCD digits but not a valid hour.
        let bytes = [0xC0, 0x79, 0x25, 0x00, 0x00];
        assert!(decode_mjd(&bytes).is_err());
    }

    #[test]
    fn test_encode_date_only_with_time_fails() {
        let mut out = [0u8; 2];
        assert!(encode_mjd(&utc(1993, 10, 13, 12, 45, 0), &mut out).is_err());
    }

    #[test]
    fn test_encodable_range_boundary() {
        let mut out = [0u8; 2];
        assert!(encode_mjd(&utc(1900, 2, 28, 0, 0, 0), &mut out).is_err());
        assert!(encode_mjd(&utc(1900, 3, 1, 0, 0, 0), &mut out).is_ok());
        // 1900-03-01 is MJD 15079.
        assert_eq!(out, [0x3A, 0xE7]);
    }

    #[test]
    fn test_century_roundtrip() {
        // Check the month/year correction around the K=1 branch (Jan/Feb).
        for &(y, mo, d) in &[
            (1999, 12, 31),
            (2000, 1, 1),
            (2000, 2, 29),
            (2000, 3, 1),
            (2038, 1, 19),
        ] {
            let date = utc(y, mo, d, 0, 0, 0);
            let mut out = [0u8; 2];
            encode_mjd(&date, &mut out).unwrap();
            assert_eq!(decode_mjd(&out).unwrap(), date, "{y}-{mo}-{d}");
        }
    }
}
