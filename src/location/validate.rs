//! Country code and CIDR validation for named locations

use crate::error::{CaError, Result};
use crate::graph::conditional_access::IpRange;
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

/// ISO 3166-1 alpha-2 codes accepted by Graph for country named locations
const VALID_COUNTRY_CODES: &[&str] = &[
    "AF", "AX", "AL", "DZ", "AS", "AD", "AO", "AI", "AQ", "AG", "AR", "AM", "AW", "AU", "AT", "AZ",
    "BS", "BH", "BD", "BB", "BY", "BE", "BZ", "BJ", "BM", "BT", "BO", "BQ", "BA", "BW", "BV", "BR",
    "IO", "BN", "BG", "BF", "BI", "KH", "CM", "CA", "CV", "KY", "CF", "TD", "CL", "CN", "CX", "CC",
    "CO", "KM", "CG", "CD", "CK", "CR", "CI", "HR", "CU", "CW", "CY", "CZ", "DK", "DJ", "DM", "DO",
    "EC", "EG", "SV", "GQ", "ER", "EE", "ET", "FK", "FO", "FJ", "FI", "FR", "GF", "PF", "TF", "GA",
    "GM", "GE", "DE", "GH", "GI", "GR", "GL", "GD", "GP", "GU", "GT", "GG", "GN", "GW", "GY", "HT",
    "HM", "VA", "HN", "HK", "HU", "IS", "IN", "ID", "IR", "IQ", "IE", "IM", "IL", "IT", "JM", "JP",
    "JE", "JO", "KZ", "KE", "KI", "KP", "KR", "KW", "KG", "LA", "LV", "LB", "LS", "LR", "LY", "LI",
    "LT", "LU", "MO", "MK", "MG", "MW", "MY", "MV", "ML", "MT", "MH", "MQ", "MR", "MU", "YT", "MX",
    "FM", "MD", "MC", "MN", "ME", "MS", "MA", "MZ", "MM", "NA", "NR", "NP", "NL", "NC", "NZ", "NI",
    "NE", "NG", "NU", "NF", "MP", "NO", "OM", "PK", "PW", "PS", "PA", "PG", "PY", "PE", "PH", "PN",
    "PL", "PT", "PR", "QA", "RE", "RO", "RU", "RW", "BL", "SH", "KN", "LC", "MF", "PM", "VC", "WS",
    "SM", "ST", "SA", "SN", "RS", "SC", "SL", "SG", "SX", "SK", "SI", "SB", "SO", "ZA", "GS", "SS",
    "ES", "LK", "SD", "SR", "SJ", "SZ", "SE", "CH", "SY", "TW", "TJ", "TZ", "TH", "TL", "TG", "TK",
    "TO", "TT", "TN", "TR", "TM", "TC", "TV", "UG", "UA", "AE", "GB", "US", "UM", "UY", "UZ", "VU",
    "VE", "VN", "VG", "VI", "WF", "EH", "YE", "ZM", "ZW",
];

static COUNTRY_CODE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn country_code_pattern() -> &'static Regex {
    COUNTRY_CODE_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z]{2}$").expect("country code pattern is a valid regex"))
}

/// Upper-cased, de-duplicated, validated country codes in input order
pub fn normalize_country_codes<S: AsRef<str>>(codes: &[S]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();

    for code in codes
        .iter()
        .map(|c| c.as_ref().trim().to_uppercase())
        .filter(|c| !c.is_empty())
    {
        if !country_code_pattern().is_match(&code) || !VALID_COUNTRY_CODES.contains(&code.as_str())
        {
            invalid.push(code);
        } else if !normalized.contains(&code) {
            normalized.push(code);
        }
    }

    if !invalid.is_empty() {
        return Err(CaError::Validation(format!(
            "Invalid country code(s): {}. Use ISO 3166-1 alpha-2 codes (e.g., US, CA, GB)",
            invalid.join(", ")
        )));
    }
    if normalized.is_empty() {
        return Err(CaError::Validation(
            "At least one country code is required".into(),
        ));
    }

    Ok(normalized)
}

/// Splits a comma-separated country list
pub fn split_country_list(countries: &str) -> Vec<String> {
    countries.split(',').map(|s| s.trim().to_string()).collect()
}

/// Parses an address or CIDR range. A bare address becomes a host range.
pub fn parse_cidr(input: &str) -> Result<IpRange> {
    let input = input.trim();
    let (address, prefix) = match input.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (input, None),
    };

    let address: IpAddr = address.parse().map_err(|_| {
        CaError::Validation(format!(
            "Invalid IP address '{}'. Expected x.x.x.x[/prefix] or an IPv6 address[/prefix]",
            address
        ))
    })?;

    let max_prefix: u8 = if address.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix {
        None => max_prefix,
        Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix).ok_or_else(|| {
            CaError::Validation(format!(
                "Invalid CIDR prefix '{}' for {}. Must be 0-{}",
                p, address, max_prefix
            ))
        })?,
    };

    let cidr_address = format!("{}/{}", address, prefix);
    Ok(match address {
        IpAddr::V4(_) => IpRange::V4 { cidr_address },
        IpAddr::V6(_) => IpRange::V6 { cidr_address },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_codes_are_uppercased_and_deduplicated() {
        let codes = normalize_country_codes(&["gb", " US ", "GB", ""]).unwrap();
        assert_eq!(codes, vec!["GB".to_string(), "US".to_string()]);
    }

    #[test]
    fn test_invalid_country_codes_are_rejected() {
        for bad in ["USA", "u1", "ZZ", "1"] {
            let err = normalize_country_codes(&[bad]).unwrap_err();
            assert!(matches!(err, CaError::Validation(_)), "{} accepted", bad);
        }
    }

    #[test]
    fn test_error_lists_every_invalid_code() {
        let err = normalize_country_codes(&["US", "USA", "u1"]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("USA"));
        assert!(message.contains("U1"));
    }

    #[test]
    fn test_empty_country_list_is_rejected() {
        assert!(normalize_country_codes(&split_country_list(" , ")).is_err());
    }

    #[test]
    fn test_bare_addresses_become_host_ranges() {
        assert_eq!(
            parse_cidr("203.0.113.50").unwrap(),
            IpRange::V4 { cidr_address: "203.0.113.50/32".into() }
        );
        assert_eq!(
            parse_cidr("2001:db8::1").unwrap(),
            IpRange::V6 { cidr_address: "2001:db8::1/128".into() }
        );
    }

    #[test]
    fn test_prefix_ranges_per_family() {
        assert!(parse_cidr("10.0.0.0/8").is_ok());
        assert!(parse_cidr("10.0.0.0/33").is_err());
        assert!(parse_cidr("2001:db8::/48").is_ok());
        assert!(parse_cidr("2001:db8::/129").is_err());
        assert!(parse_cidr("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_garbage_address_is_rejected() {
        assert!(parse_cidr("999.1.1.1/24").is_err());
        assert!(parse_cidr("hq-office").is_err());
    }
}
