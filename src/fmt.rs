fn with_commas(int_part: &str) -> String {
    let mut out = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.chars().rev().collect()
}

/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let negative = val < 0.0;
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    let int_part = with_commas(int_part);

    if negative {
        format!("-${int_part}.{dec_part}")
    } else {
        format!("${int_part}.{dec_part}")
    }
}

/// Whole-number count with thousands separators: 12,345
pub fn count(val: f64) -> String {
    let rounded = format!("{:.0}", val.abs());
    let sign = if val < 0.0 && rounded != "0" { "-" } else { "" };
    format!("{sign}{}", with_commas(&rounded))
}

/// A fraction shown as a percentage: 0.7917 -> 79.17%
pub fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// A value already in percentage points: 79.17 -> 79.17%
pub fn rate(points: f64) -> String {
    format!("{points:.2}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(-500.00), "-$500.00");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1000000.99), "$1,000,000.99");
        assert_eq!(money(42.10), "$42.10");
    }

    #[test]
    fn test_count_formatting() {
        assert_eq!(count(0.0), "0");
        assert_eq!(count(12345.0), "12,345");
        assert_eq!(count(-1000.0), "-1,000");
        assert_eq!(count(999.4), "999");
    }

    #[test]
    fn test_percent_and_rate() {
        assert_eq!(percent(0.75), "75.00%");
        assert_eq!(percent(0.0), "0.00%");
        assert_eq!(rate(79.1666), "79.17%");
        assert_eq!(rate(100.0), "100.00%");
    }
}
