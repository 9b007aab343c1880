/// Renders a float the way scripts see it: integral values without a
/// fractional part, everything else in shortest round-trip form.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf".to_string() } else { "-Inf".to_string() };
    }
    if v.fract() == 0.0 && v.abs() < 1e21 {
        return format!("{v:.0}");
    }
    let mut buf = ryu::Buffer::new();
    buf.format_finite(v).to_string()
}

/// Fixed-point rendering with `places` decimals.
pub fn format_fixed(v: f64, places: usize) -> String {
    format!("{v:.places$}")
}
