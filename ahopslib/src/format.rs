//! Rendering of raw planck balances.

/// `raw` scaled by `decimals`, without trailing zeros, followed by `symbol`.
///
/// ```
/// use ahopslib::format::format_balance;
/// assert_eq!(format_balance(125_000_000_000, 10, "DOT"), "12.5 DOT");
/// ```
pub fn format_balance(raw: u128, decimals: u32, symbol: &str) -> String {
    let amount = match 10u128.checked_pow(decimals) {
        Some(unit) => {
            let whole = raw / unit;
            let fraction = raw % unit;
            if fraction == 0 {
                whole.to_string()
            } else {
                let fraction = format!("{:0width$}", fraction, width = decimals as usize);
                format!("{}.{}", whole, fraction.trim_end_matches('0'))
            }
        }
        // more decimals than a u128 can scale by, every representable balance is below one unit
        None => {
            let digits = raw.to_string();
            let padding = (decimals as usize).saturating_sub(digits.len());
            let fraction = format!("{}{}", "0".repeat(padding), digits);
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                "0".to_string()
            } else {
                format!("0.{}", fraction)
            }
        }
    };
    if symbol.is_empty() {
        amount
    } else {
        format!("{} {}", amount, symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::format_balance;

    #[test]
    fn scales_by_decimals() {
        assert_eq!(format_balance(125_000_000_000, 10, "DOT"), "12.5 DOT");
        assert_eq!(format_balance(10_000_000_000, 10, "DOT"), "1 DOT");
        assert_eq!(format_balance(1, 10, "DOT"), "0.0000000001 DOT");
        assert_eq!(format_balance(0, 10, "DOT"), "0 DOT");
    }

    #[test]
    fn zero_decimals_and_no_symbol() {
        assert_eq!(format_balance(42, 0, "UNIT"), "42 UNIT");
        assert_eq!(format_balance(1_500, 3, ""), "1.5");
    }

    #[test]
    fn huge_decimals_do_not_overflow() {
        assert_eq!(format_balance(5, 40, "X"), "0.0000000000000000000000000000000000000005 X");
        assert_eq!(format_balance(0, 40, "X"), "0 X");
    }
}
