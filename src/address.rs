// 📮 Address Normalizer - Deterministic string normalization for deduplication
//
// Pure functions, no I/O. Every function here is safe to call on untrusted input:
// malformed values normalize to "" or None, never to an error.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::entities::state::{code_for_state_name, is_state_code};

// ============================================================================
// PATTERNS
// ============================================================================

const STATE_CODES: &str = "al|ak|az|ar|ca|co|ct|de|dc|fl|ga|hi|id|il|in|ia|ks|ky|la|me|md|ma|mi|mn|ms|mo|mt|ne|nv|nh|nj|nm|ny|nc|nd|oh|ok|or|pa|ri|sc|sd|tn|tx|ut|vt|va|wa|wv|wi|wy";

const STATE_NAMES: &str = r"alabama|alaska|arizona|arkansas|california|colorado|connecticut|delaware|florida|georgia|hawaii|idaho|illinois|indiana|iowa|kansas|kentucky|louisiana|maine|maryland|massachusetts|michigan|minnesota|mississippi|missouri|montana|nebraska|nevada|new\s+hampshire|new\s+jersey|new\s+mexico|new\s+york|north\s+carolina|north\s+dakota|ohio|oklahoma|oregon|pennsylvania|rhode\s+island|south\s+carolina|south\s+dakota|tennessee|texas|utah|vermont|virginia|washington|west\s+virginia|wisconsin|wyoming|district\s+of\s+columbia";

lazy_static! {
    // Trailing 2-letter code, optionally followed by ZIP / ZIP+4
    static ref TRAILING_STATE_CODE: Regex = Regex::new(&format!(
        r"[,\s]+({STATE_CODES})(?:\s+\d{{5}})?(?:[-\s]*\d{{4}})?\s*$"
    ))
    .unwrap();

    // Trailing full state name after a comma, optionally followed by ZIP / ZIP+4
    static ref TRAILING_STATE_NAME: Regex = Regex::new(&format!(
        r",\s*({STATE_NAMES})(?:,?\s*\d{{5}})?(?:[-\s]*\d{{4}})?\s*$"
    ))
    .unwrap();

    static ref NOISE_WORDS: Regex = Regex::new(r"\b(usa|united\s+states)\b").unwrap();
    static ref PUNCTUATION: Regex = Regex::new(r"[^a-z0-9_\s]").unwrap();
    static ref DOUBLED_ZIP: Regex = Regex::new(r"\b(\d{5})\s+(\d{5})\s*$").unwrap();
    static ref TRAILING_ZIP: Regex = Regex::new(r"\s+\d{5}(?:[-\s]*\d{4})?\s*$").unwrap();
    static ref STRIP_STATE_NAME: Regex =
        Regex::new(&format!(r"\s({STATE_NAMES})\s*$")).unwrap();
    static ref STRIP_STATE_CODE: Regex =
        Regex::new(&format!(r"\b({STATE_CODES})\s*$")).unwrap();

    // (pattern, canonical short form), applied in order
    static ref STREET_SUFFIXES: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"\b(street|str)\b").unwrap(), "st"),
        (Regex::new(r"\b(avenue|ave)\b").unwrap(), "av"),
        (Regex::new(r"\b(boulevard|blvd)\b").unwrap(), "bl"),
        (Regex::new(r"\b(highway|hwy)\b").unwrap(), "hw"),
        (Regex::new(r"\bfreeway\b").unwrap(), "fwy"),
        (Regex::new(r"\bdrive\b").unwrap(), "dr"),
        (Regex::new(r"\broad\b").unwrap(), "rd"),
        (Regex::new(r"\blane\b").unwrap(), "ln"),
        (Regex::new(r"\bcourt\b").unwrap(), "ct"),
        (Regex::new(r"\bcircle\b").unwrap(), "cir"),
        (Regex::new(r"\bplace\b").unwrap(), "pl"),
        (Regex::new(r"\bterrace\b").unwrap(), "ter"),
        (Regex::new(r"\bparkway\b").unwrap(), "pkwy"),
        (Regex::new(r"\bway\b").unwrap(), "wy"),
        (Regex::new(r"\bsuite\b").unwrap(), "ste"),
        (Regex::new(r"\bapartment\b").unwrap(), "apt"),
    ];

    static ref DIRECTIONALS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"\bnorth\b").unwrap(), "n"),
        (Regex::new(r"\bsouth\b").unwrap(), "s"),
        (Regex::new(r"\beast\b").unwrap(), "e"),
        (Regex::new(r"\bwest\b").unwrap(), "w"),
        (Regex::new(r"\bnortheast\b").unwrap(), "ne"),
        (Regex::new(r"\bnorthwest\b").unwrap(), "nw"),
        (Regex::new(r"\bsoutheast\b").unwrap(), "se"),
        (Regex::new(r"\bsouthwest\b").unwrap(), "sw"),
    ];

    // Designator token plus the token that follows it
    static ref UNIT_DESIGNATOR: Regex =
        Regex::new(r"\b(ste|unit|apt|bldg|building|floor|fl)\b\s*\w*").unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    static ref BUSINESS_SUFFIXES: Regex =
        Regex::new(r"\b(llc|inc|corp|corporation|company|co|ltd|limited)\b").unwrap();
    static ref ARTICLES: Regex = Regex::new(r"\b(the|a|an)\b").unwrap();
    static ref INDUSTRY_TERMS: Regex = Regex::new(
        r"\b(appliance|repair|service|services|tech|technician|technicians)\b"
    )
    .unwrap();

    static ref TRAILING_ZIP_TOKEN: Regex = Regex::new(
        r"(?i)\b(\d{5})(?:-\d{4})?\s*(?:,?\s*(?:usa?|united states)?)?$"
    )
    .unwrap();

    static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Passes needed before normalization reaches its fixed point.
/// Unit stripping can expose a trailing ZIP or state that the earlier
/// trailing-anchored strips have already passed over.
const MAX_NORMALIZE_PASSES: usize = 8;

// ============================================================================
// ADDRESS
// ============================================================================

/// Normalize an address string for consistent comparison.
///
/// The trailing state (code or full name) is extracted before anything is
/// stripped and re-appended as a 2-letter code at the very end, so that
/// identical street addresses in different states never collide.
///
/// Idempotent: `normalize_address(&normalize_address(x)) == normalize_address(x)`.
pub fn normalize_address(raw: &str) -> String {
    let mut current = normalize_pass(raw);

    for _ in 0..MAX_NORMALIZE_PASSES {
        let next = normalize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }

    current
}

fn normalize_pass(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let lowered = raw.to_lowercase();
    let state_code = extract_state_code(&lowered);

    let mut normalized = NOISE_WORDS.replace_all(&lowered, "").into_owned();
    normalized = PUNCTUATION.replace_all(&normalized, " ").into_owned();
    normalized = strip_doubled_zip(&normalized);
    normalized = TRAILING_ZIP.replace(&normalized, "").into_owned();
    normalized = STRIP_STATE_NAME.replace(&normalized, "").into_owned();
    normalized = STRIP_STATE_CODE.replace(&normalized, "").into_owned();

    for (pattern, short) in STREET_SUFFIXES.iter() {
        normalized = pattern.replace_all(&normalized, *short).into_owned();
    }
    for (pattern, short) in DIRECTIONALS.iter() {
        normalized = pattern.replace_all(&normalized, *short).into_owned();
    }

    normalized = UNIT_DESIGNATOR.replace_all(&normalized, "").into_owned();
    normalized = WHITESPACE.replace_all(&normalized, " ").trim().to_string();

    match state_code {
        Some(code) if normalized.is_empty() => code,
        Some(code) => format!("{} {}", normalized, code),
        None => normalized,
    }
}

/// Trailing 2-letter code first, then a trailing full state name
fn extract_state_code(lowered: &str) -> Option<String> {
    if let Some(caps) = TRAILING_STATE_CODE.captures(lowered) {
        return Some(caps[1].to_string());
    }

    let caps = TRAILING_STATE_NAME.captures(lowered)?;
    let name = WHITESPACE.replace_all(&caps[1], " ");
    code_for_state_name(&name)
        .map(|code| code.to_lowercase())
        .filter(|code| is_state_code(code))
}

/// "02903 02903" at the end → ""
fn strip_doubled_zip(s: &str) -> String {
    if let Some(caps) = DOUBLED_ZIP.captures(s) {
        if caps[1] == caps[2] {
            if let Some(m) = caps.get(0) {
                return s[..m.start()].to_string();
            }
        }
    }
    s.to_string()
}

/// 16 hex chars of SHA-256 over the normalized address.
/// Empty normalized input gives an empty hash, not the digest of "".
pub fn hash_address(raw: &str) -> String {
    let normalized = normalize_address(raw);
    if normalized.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Trailing 5-digit ZIP within the USPS numeric range (00501..=99950)
pub fn extract_zip_from_address(raw: &str) -> Option<String> {
    let caps = TRAILING_ZIP_TOKEN.captures(raw.trim())?;
    let zip = caps[1].to_string();
    let value: u32 = zip.parse().ok()?;

    if (501..=99950).contains(&value) {
        Some(zip)
    } else {
        None
    }
}

// ============================================================================
// PHONE
// ============================================================================

/// US-only E.164 form.
///
/// 10 digits → `+1XXXXXXXXXX`, 11 digits starting with 1 → `+1XXXXXXXXXX`,
/// anything else → `None`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        10 => Some(format!("+1{}", digits)),
        11 if digits.starts_with('1') => Some(format!("+{}", digits)),
        _ => None,
    }
}

// ============================================================================
// BUSINESS NAME
// ============================================================================

/// Soft-grouping key for business names.
///
/// Drops punctuation, legal-entity suffixes, leading articles and the
/// appliance-repair boilerplate words that nearly every listing carries.
pub fn normalize_business_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut name = PUNCTUATION.replace_all(&lowered, "").into_owned();
    name = BUSINESS_SUFFIXES.replace_all(&name, "").into_owned();
    name = ARTICLES.replace_all(&name, "").into_owned();
    name = INDUSTRY_TERMS.replace_all(&name, "").into_owned();
    WHITESPACE.replace_all(&name, " ").trim().to_string()
}

// ============================================================================
// SLUG
// ============================================================================

/// Lowercase, non-alphanumeric runs → single hyphen, hyphens trimmed
pub fn slugify(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    NON_SLUG
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ADDRESSES: &[&str] = &[
        "123 Main Street, Suite 400, Springfield, Illinois 62704",
        "123 Main St, Springfield, IL",
        "55 North Broad Street, Providence, RI 02903 02903",
        "1 Ocean Blvd Apt 7, Miami, FL 33139-1234",
        "100 Main St 62704 Ste 5",
        "742 Evergreen Terrace, Austin, TX, USA",
        "10 Elm Court, Hartford, CT",
        "9 Skyline Parkway, Building C, Denver, Colorado",
        "x, il 1234",
        "Unit 4, 200 West Way",
        "il",
        "   ",
        "",
    ];

    #[test]
    fn test_normalize_address_is_idempotent() {
        for raw in SAMPLE_ADDRESSES {
            let once = normalize_address(raw);
            let twice = normalize_address(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_suite_and_full_state_name_collapse_to_same_core() {
        let long = normalize_address("123 Main Street, Suite 400, Springfield, Illinois 62704");
        let short = normalize_address("123 Main St, Springfield, IL");

        assert!(long.starts_with("123 main st springfield"), "got {}", long);
        assert!(short.starts_with("123 main st springfield"), "got {}", short);
        assert!(long.ends_with(" il"));
        assert!(short.ends_with(" il"));
        assert_eq!(long, short);
    }

    #[test]
    fn test_state_code_reappended_with_zip_plus_four() {
        assert_eq!(
            normalize_address("1 Ocean Blvd Apt 7, Miami, FL 33139-1234"),
            "1 ocean bl miami fl"
        );
    }

    #[test]
    fn test_doubled_zip_stripped() {
        // A doubled ZIP is not a recognised state suffix, so the code is dropped
        assert_eq!(
            normalize_address("55 North Broad Street, Providence, RI 02903 02903"),
            "55 n broad st providence"
        );
        assert_eq!(
            normalize_address("55 North Broad Street, Providence, RI 02903"),
            "55 n broad st providence ri"
        );
    }

    #[test]
    fn test_usa_suffix_blocks_state_extraction() {
        // Trailing "USA" hides the code from extraction; the code is still stripped
        assert_eq!(
            normalize_address("742 Evergreen Terrace, Austin, TX, USA"),
            "742 evergreen ter austin"
        );
    }

    #[test]
    fn test_mid_string_state_name_is_not_extracted() {
        let normalized = normalize_address("Indiana Appliance Co, 5 Main St");
        assert_eq!(normalized, "indiana appliance co 5 main st");
    }

    #[test]
    fn test_unit_designator_needs_whole_token() {
        assert_eq!(normalize_address("12 Flower Street"), "12 flower st");
        assert_eq!(normalize_address("12 Main St Fl 3"), "12 main st");
    }

    #[test]
    fn test_empty_address() {
        assert_eq!(normalize_address(""), "");
        assert_eq!(normalize_address("   "), "");
    }

    #[test]
    fn test_hash_address() {
        let a = hash_address("123 Main Street, Suite 400, Springfield, Illinois 62704");
        let b = hash_address("123 Main St, Springfield, IL");

        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(hash_address(""), "");
        assert_eq!(hash_address(" , "), "");
    }

    #[test]
    fn test_normalize_phone() {
        let expected = Some("+15551234567".to_string());
        assert_eq!(normalize_phone("(555) 123-4567"), expected);
        assert_eq!(normalize_phone("15551234567"), expected);
        assert_eq!(normalize_phone("5551234567"), expected);
        assert_eq!(normalize_phone("+1 555.123.4567"), expected);
    }

    #[test]
    fn test_normalize_phone_rejects_non_us() {
        assert_eq!(normalize_phone("+44 20 7946 0958"), None);
        assert_eq!(normalize_phone("25551234567"), None);
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[test]
    fn test_normalize_business_name() {
        assert_eq!(normalize_business_name("ABC Appliance Repair LLC"), "abc");
        assert_eq!(normalize_business_name("Abc Appliance"), "abc");
        assert_eq!(
            normalize_business_name("The Fix-It Guys, Inc."),
            "fixit guys"
        );
        assert_eq!(normalize_business_name(""), "");
    }

    #[test]
    fn test_extract_zip_from_address() {
        assert_eq!(
            extract_zip_from_address("123 Main St, Springfield, IL 62704"),
            Some("62704".to_string())
        );
        assert_eq!(
            extract_zip_from_address("1 Ocean Blvd, Miami, FL 33139-1234"),
            Some("33139".to_string())
        );
        assert_eq!(
            extract_zip_from_address("1 Main St, Austin, TX 78701, USA"),
            Some("78701".to_string())
        );
        assert_eq!(extract_zip_from_address("1 Main St, Nowhere 00100"), None);
        assert_eq!(extract_zip_from_address("62704 Main St, Springfield"), None);
        assert_eq!(extract_zip_from_address(""), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("St. Louis"), "st-louis");
        assert_eq!(slugify("  Winston--Salem  "), "winston-salem");
        assert_eq!(slugify("ABC Repair-Springfield"), "abc-repair-springfield");
        assert_eq!(slugify("!!!"), "");
    }
}
