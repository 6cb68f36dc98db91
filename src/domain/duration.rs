// Human-readable interval strings ("10s", "5m", "1h30m") to seconds

const UNITS: [(char, u64); 4] = [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)];

/// Parse a duration such as `1h30m` into whole seconds.
///
/// Each of `d`, `h`, `m`, `s` contributes the digits immediately before its first
/// occurrence. Units without a numeric prefix are ignored, and an input with no
/// recognised unit yields 0.
pub fn parse_duration(text: &str) -> u64 {
    UNITS
        .iter()
        .map(|&(unit, factor)| unit_value(text, unit).saturating_mul(factor))
        .fold(0u64, u64::saturating_add)
}

fn unit_value(text: &str, unit: char) -> u64 {
    let mut digits_start = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_ascii_digit() {
            digits_start.get_or_insert(idx);
            continue;
        }
        if ch == unit {
            return digits_start
                .and_then(|start| text[start..idx].parse::<u64>().ok())
                .unwrap_or(0);
        }
        digits_start = None;
    }
    0
}
