/// Format a fee amount with a dollar sign, thousands separators and two
/// decimals: `$1,234.56`. The sign follows the dollar sign (`$-12.00`) so
/// summaries line up with the ones the finance team already receives.
pub fn money(val: f64) -> String {
    if !val.is_finite() {
        return "$nan".to_string();
    }
    let negative = val.is_sign_negative() && val != 0.0;
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("$-{with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

/// Render an optional amount for detail views; missing values print empty.
pub fn opt_amount(val: Option<f64>) -> String {
    val.map(|v| format!("{v:.2}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1000000.99), "$1,000,000.99");
        assert_eq!(money(42.10), "$42.10");
        assert_eq!(money(75.0), "$75.00");
    }

    #[test]
    fn test_money_negative_and_rounding() {
        assert_eq!(money(-500.00), "$-500.00");
        assert_eq!(money(999.999), "$1,000.00");
        assert_eq!(money(0.005), "$0.01");
    }

    #[test]
    fn test_money_non_finite() {
        assert_eq!(money(f64::NAN), "$nan");
    }

    #[test]
    fn test_opt_amount() {
        assert_eq!(opt_amount(Some(20.0)), "20.00");
        assert_eq!(opt_amount(None), "");
    }
}
