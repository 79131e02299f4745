//! Sample width conversion and serialized payload parsing.

use serde_json::Value;

/// Converts an f32 sample in [-1.0, 1.0] to i16.
///
/// Values outside this range are clamped.
///
/// Uses × 32767 (not 32768) for symmetric scaling. This means -1.0 maps
/// to -32767 rather than -32768, losing 1 LSB at the negative extreme.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Narrows a raw (unnormalized) PCM value to i16, clamping and mapping NaN to 0.
#[inline]
pub fn raw_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    sample.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Narrows a raw (unnormalized) PCM value to i8, clamping and mapping NaN to 0.
#[inline]
pub fn raw_to_i8(sample: f32) -> i8 {
    if sample.is_nan() {
        return 0;
    }
    sample.clamp(f32::from(i8::MIN), f32::from(i8::MAX)) as i8
}

/// Widens 16-bit PCM to the crate's sample type without scaling.
pub fn widen_i16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s)).collect()
}

/// Widens 8-bit PCM to the crate's sample type without scaling.
pub fn widen_i8(samples: &[i8]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s)).collect()
}

/// Parses a serialized sample list such as `"[12, -40, 7]"`.
///
/// Numbers are taken as-is; numeric strings are parsed; anything else
/// (`null`, empty strings, objects) becomes NaN rather than failing the
/// whole chunk. Only a payload that is not a JSON array is an error.
///
/// # Example
///
/// ```
/// use pcm_relay::format::parse_sample_list;
///
/// let samples = parse_sample_list("[1, -2, null]").unwrap();
/// assert_eq!(samples.len(), 3);
/// assert!(samples[2].is_nan());
/// ```
pub fn parse_sample_list(text: &str) -> Result<Vec<f32>, serde_json::Error> {
    let values: Vec<Value> = serde_json::from_str(text)?;
    Ok(values.iter().map(value_to_sample).collect())
}

fn value_to_sample(value: &Value) -> f32 {
    match value {
        Value::Number(n) => n.as_f64().map_or(f32::NAN, |v| v as f32),
        Value::String(s) => s.trim().parse::<f32>().unwrap_or(f32::NAN),
        _ => f32::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_full_range() {
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32767);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_f32_to_i16_clamping() {
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
    }

    #[test]
    fn test_raw_narrowing() {
        assert_eq!(raw_to_i16(1234.0), 1234);
        assert_eq!(raw_to_i16(40000.0), i16::MAX);
        assert_eq!(raw_to_i16(f32::NAN), 0);
        assert_eq!(raw_to_i8(-100.0), -100);
        assert_eq!(raw_to_i8(-300.0), i8::MIN);
    }

    #[test]
    fn test_widen() {
        assert_eq!(widen_i16(&[-32768, 0, 32767]), vec![-32768.0, 0.0, 32767.0]);
        assert_eq!(widen_i8(&[-128, 5]), vec![-128.0, 5.0]);
    }

    #[test]
    fn test_parse_sample_list() {
        let samples = parse_sample_list("[100, 200, -32768]").unwrap();
        assert_eq!(samples, vec![100.0, 200.0, -32768.0]);
    }

    #[test]
    fn test_parse_sample_list_non_numeric_becomes_nan() {
        let samples = parse_sample_list(r#"[1, "2.5", "abc", null]"#).unwrap();
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[1], 2.5);
        assert!(samples[2].is_nan());
        assert!(samples[3].is_nan());
    }

    #[test]
    fn test_parse_sample_list_rejects_non_list() {
        assert!(parse_sample_list("{\"data\": 1}").is_err());
        assert!(parse_sample_list("not json").is_err());
    }
}
