//! Monetary helpers
//!
//! Amounts travel through the system as integer minor units (centavos).
//! Conversion from major units happens once at the transfer boundary, and
//! formatting exists only for human-facing notification text.

/// Convert a major-unit amount (e.g. `100.50`) to minor units, rounding to
/// the nearest cent.
pub fn major_to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Format minor units for display: `123456` becomes `R$ 1.234,56`.
pub fn format_brl(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    let reais = (abs / 100).to_string();
    let cents = abs % 100;

    let mut grouped = String::with_capacity(reais.len() + reais.len() / 3);
    let len = reais.len();
    for (i, ch) in reais.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{sign}R$ {grouped},{cents:02}")
}
