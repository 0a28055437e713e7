// Party identifier normalization and address-form detection.

use std::net::{Ipv4Addr, Ipv6Addr};

use unicode_normalization::UnicodeNormalization;

/// Invisible marks that survive copy-paste from rendered pages.
const INVISIBLE_MARKS: [char; 4] = ['\u{200E}', '\u{200F}', '\u{200B}', '\u{FEFF}'];

/// Canonicalize a party identifier.
///
/// Underscores become spaces, invisible directional and zero-width marks
/// are stripped, the result is NFC-normalized and trimmed. Address forms
/// are upper-cased; registered names get their first letter capitalized.
pub fn normalize(raw: &str) -> String {
    let cleaned: String = raw
        .replace('_', " ")
        .chars()
        .filter(|c| !INVISIBLE_MARKS.contains(c))
        .nfc()
        .collect();
    let trimmed = cleaned.trim();

    if is_address_form(trimmed) {
        return trimmed.to_uppercase();
    }

    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Whether an identifier is an IP address or CIDR range rather than a
/// registered account name.
pub fn is_address_form(value: &str) -> bool {
    let (host, prefix) = match value.split_once('/') {
        Some((host, prefix)) => (host, Some(prefix)),
        None => (value, None),
    };

    let is_v4 = host.parse::<Ipv4Addr>().is_ok();
    let is_v6 = host.parse::<Ipv6Addr>().is_ok();
    if !is_v4 && !is_v6 {
        return false;
    }

    match prefix {
        None => true,
        Some(prefix) => match prefix.parse::<u8>() {
            Ok(bits) if is_v4 => bits <= 32,
            Ok(bits) => bits <= 128,
            Err(_) => false,
        },
    }
}

/// Whether an address form covers more than a single host.
pub fn is_range(value: &str) -> bool {
    is_address_form(value) && value.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_underscores_and_whitespace() {
        assert_eq!(normalize("  foo_bar "), "Foo bar");
    }

    #[test]
    fn capitalizes_first_letter_only() {
        assert_eq!(normalize("alice B"), "Alice B");
        assert_eq!(normalize("Älice"), "Älice");
    }

    #[test]
    fn strips_invisible_marks() {
        assert_eq!(normalize("\u{200E}Alice\u{200B}"), "Alice");
    }

    #[test]
    fn addresses_are_uppercased() {
        assert_eq!(normalize("::1"), "::1");
        assert_eq!(normalize("2001:db8::ff"), "2001:DB8::FF");
        assert_eq!(normalize("192.0.2.7"), "192.0.2.7");
    }

    #[test]
    fn detects_addresses_and_ranges() {
        assert!(is_address_form("192.0.2.7"));
        assert!(is_address_form("192.0.2.0/24"));
        assert!(is_address_form("2001:db8::/32"));
        assert!(!is_address_form("Alice"));
        assert!(!is_address_form("192.0.2.0/33"));
        assert!(!is_address_form("2001:db8::/129"));
        assert!(!is_address_form("192.0.2.0/"));
    }

    #[test]
    fn range_requires_prefix() {
        assert!(is_range("10.0.0.0/16"));
        assert!(!is_range("10.0.0.1"));
        assert!(!is_range("Alice/24"));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize("   "), "");
    }
}
