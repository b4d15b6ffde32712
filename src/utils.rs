use anyhow::{Result, bail};

/// Parses sizes such as `512`, `64K`, `1.5M` or `5G` (1024-based) into bytes.
pub fn parse_size(value: &str) -> Result<u64> {
    let value = value.trim().to_ascii_uppercase();
    if value.is_empty() {
        bail!("Size cannot be empty");
    }

    let (number, multiplier) = match value.char_indices().last() {
        Some((idx, 'B')) => (&value[..idx], 1u64),
        Some((idx, 'K')) => (&value[..idx], 1024),
        Some((idx, 'M')) => (&value[..idx], 1024 * 1024),
        Some((idx, 'G')) => (&value[..idx], 1024 * 1024 * 1024),
        _ => (value.as_str(), 1),
    };

    let number: f64 = match number.trim().parse() {
        Ok(number) => number,
        Err(_) => bail!("Invalid size value: {}", value),
    };
    if !number.is_finite() || number <= 0.0 {
        bail!("Size must be greater than zero: {}", value);
    }
    Ok((number * multiplier as f64) as u64)
}
