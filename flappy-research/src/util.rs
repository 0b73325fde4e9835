use anyhow::{anyhow, Context, Result};

/// Study seeds from the CLI or JSON, decimal or `0x` hex. Underscores are
/// allowed in hex so `0xF1A9_0001` reads the same as in the defaults.
pub fn parse_seed(seed: &str) -> Result<u32> {
    let s = seed.trim();
    if s.is_empty() {
        return Err(anyhow!("empty seed"));
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(&hex.replace('_', ""), 16)
            .with_context(|| format!("invalid hex seed: {s}"))
    } else {
        s.parse::<u32>()
            .with_context(|| format!("invalid decimal seed: {s}"))
    }
}

/// Fixed-width form used for `seed=` output and the `seed` CSV column.
pub fn seed_to_hex(seed: u32) -> String {
    format!("0x{seed:08x}")
}

pub fn parse_u32_csv(input: &str, what: &str) -> Result<Vec<u32>> {
    let mut values = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        values.push(
            token
                .parse::<u32>()
                .with_context(|| format!("invalid {what} value: {token}"))?,
        );
    }
    if values.is_empty() {
        return Err(anyhow!("no {what} values parsed from '{input}'"));
    }
    Ok(values)
}

pub fn parse_f64_csv(input: &str, what: &str) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let value = token
            .parse::<f64>()
            .with_context(|| format!("invalid {what} value: {token}"))?;
        if !value.is_finite() {
            return Err(anyhow!("{what} value must be finite: {token}"));
        }
        values.push(value);
    }
    if values.is_empty() {
        return Err(anyhow!("no {what} values parsed from '{input}'"));
    }
    Ok(values)
}

/// Renders sweep parameters without a trailing `.0` for whole numbers.
pub fn format_param(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
