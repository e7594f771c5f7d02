use cosmwasm_std::Uint128;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("negative amount: {0}")]
    Negative(String),

    #[error("amount {value} has more than {decimals} decimal places")]
    TooPrecise { value: String, decimals: u32 },

    #[error("amount overflow: {0}")]
    Overflow(String),

    #[error("invalid decimal: {0}")]
    Invalid(String),
}

/// Convert a human decimal amount to integer base units.
pub fn to_base_units(value: Decimal, decimals: u32) -> Result<Uint128, UnitsError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(UnitsError::Negative(value.to_string()));
    }

    let normalized = value.normalize();
    if normalized.scale() > decimals {
        return Err(UnitsError::TooPrecise {
            value: value.to_string(),
            decimals,
        });
    }

    // mantissa * 10^(decimals - scale), done in u128 since Decimal tops out at 28 digits
    let mantissa = u128::try_from(normalized.mantissa())
        .map_err(|_| UnitsError::Negative(value.to_string()))?;
    let factor = 10u128
        .checked_pow(decimals - normalized.scale())
        .ok_or_else(|| UnitsError::Overflow(value.to_string()))?;
    mantissa
        .checked_mul(factor)
        .map(Uint128::new)
        .ok_or_else(|| UnitsError::Overflow(value.to_string()))
}

pub fn parse_base_units(s: &str, decimals: u32) -> Result<Uint128, UnitsError> {
    let value = Decimal::from_str(s.trim()).map_err(|e| UnitsError::Invalid(e.to_string()))?;
    to_base_units(value, decimals)
}

/// Render base units as a decimal string (for logs and CLI output).
pub fn format_base_units(amount: Uint128, decimals: u32) -> String {
    let raw = amount.u128();
    let unit = 10u128.pow(decimals);
    let whole = raw / unit;
    let frac = raw % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_and_fractional_amounts() {
        assert_eq!(
            parse_base_units("100", 18).unwrap(),
            Uint128::new(100_000_000_000_000_000_000)
        );
        assert_eq!(
            parse_base_units("1.5", 18).unwrap(),
            Uint128::new(1_500_000_000_000_000_000)
        );
        assert_eq!(parse_base_units("0", 18).unwrap(), Uint128::zero());
    }

    #[test]
    fn test_rejects_negative_and_too_precise() {
        assert!(matches!(
            parse_base_units("-1", 18),
            Err(UnitsError::Negative(_))
        ));
        assert!(matches!(
            parse_base_units("0.001", 2),
            Err(UnitsError::TooPrecise { .. })
        ));
        assert!(matches!(
            parse_base_units("abc", 18),
            Err(UnitsError::Invalid(_))
        ));
    }

    #[test]
    fn test_format_base_units() {
        assert_eq!(
            format_base_units(Uint128::new(1_500_000_000_000_000_000), 18),
            "1.5"
        );
        assert_eq!(
            format_base_units(Uint128::new(200_000_000_000_000_000_000), 18),
            "200"
        );
    }
}
