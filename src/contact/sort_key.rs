// Sort-key derivation: names first, then org/tel/email with a trailing `#`, folded to upper-case ASCII.
use unicode_normalization::char::decompose_canonical;

use crate::contact::{DisplayName, RawContact, first_entry};

/// Appended to fallback keys so nameless contacts land after named ones.
pub const SENTINEL: char = '#';

/// Builds the order string for `raw`.
///
/// When a display name is supplied and it is a real name, its given and family names are
/// used. A synthesized display name (`modified`) is ignored and the raw fallback fields are
/// used instead. The result is trimmed, upper-cased, and never empty.
pub fn build_sort_key(raw: &RawContact, display: Option<&DisplayName>) -> String {
    let (given, family) = match display {
        Some(display) if display.modified => ("", ""),
        Some(display) => (
            first_trimmed(Some(&display.given_name)),
            first_trimmed(display.family_name.as_ref()),
        ),
        None => (
            first_trimmed(raw.given_name.as_ref()),
            first_trimmed(raw.family_name.as_ref()),
        ),
    };

    if !given.is_empty() || !family.is_empty() {
        let key = fold(&format!("{given}{family}"));
        if !key.is_empty() {
            return key;
        }
    }

    let mut key = String::new();
    if let Some(org) = &raw.org {
        key.push_str(&org.join(","));
    }
    if let Some(tel) = raw.tel.as_ref().and_then(|fields| fields.first()) {
        key.push_str(tel.value().trim());
    }
    if let Some(email) = raw.email.as_ref().and_then(|fields| fields.first()) {
        key.push_str(email.value().trim());
    }
    key.push(SENTINEL);
    fold(&key)
}

fn first_trimmed(list: Option<&Vec<String>>) -> &str {
    first_entry(list).map(str::trim).unwrap_or_default()
}

fn fold(value: &str) -> String {
    to_ascii(value).to_uppercase().trim().to_string()
}

/// Strips accents from Latin and Greek letters and expands the Latin letters that have no
/// canonical decomposition (`ß`, `Æ`, `Ø`, ...). Other scripts pass through unchanged.
pub fn to_ascii(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        if let Some(expanded) = expand_latin(c) {
            out.push_str(expanded);
            continue;
        }
        let mut base = None;
        decompose_canonical(c, |part| {
            if base.is_none() {
                base = Some(part);
            }
        });
        match base {
            Some(base) if base != c && (base.is_ascii() || is_greek(base)) => out.push(base),
            _ => out.push(c),
        }
    }
    out
}

fn is_greek(c: char) -> bool {
    ('\u{0370}'..='\u{03FF}').contains(&c)
}

fn expand_latin(c: char) -> Option<&'static str> {
    let expanded = match c {
        'ß' => "ss",
        'ẞ' => "SS",
        'ŉ' => "'n",
        'Æ' => "AE",
        'æ' => "ae",
        'Ø' => "O",
        'ø' => "o",
        'Œ' => "OE",
        'œ' => "oe",
        'Đ' | 'Ð' => "D",
        'đ' | 'ð' => "d",
        'Ł' => "L",
        'ł' => "l",
        'Þ' => "TH",
        'þ' => "th",
        'Ħ' => "H",
        'ħ' => "h",
        'ı' => "i",
        _ => return None,
    };
    Some(expanded)
}

#[cfg(test)]
mod tests {
    use super::{build_sort_key, to_ascii};
    use crate::contact::{DisplayName, RawContact};

    #[test]
    fn names_are_concatenated_and_upper_cased() {
        let raw = RawContact::new("1")
            .with_given_name("  Émile ")
            .with_family_name("Zola");
        assert_eq!(build_sort_key(&raw, None), "EMILEZOLA");
    }

    #[test]
    fn family_name_alone_is_enough() {
        let raw = RawContact::new("1").with_family_name("zeta");
        assert_eq!(build_sort_key(&raw, None), "ZETA");
    }

    #[test]
    fn fallback_joins_org_then_phone_then_email() {
        let raw = RawContact::new("1")
            .with_org("Acme")
            .with_org("Labs")
            .with_tel(" 555 ")
            .with_email("x@y.z");
        assert_eq!(build_sort_key(&raw, None), "ACME,LABS555X@Y.Z#");
    }

    #[test]
    fn empty_contact_gets_sentinel() {
        assert_eq!(build_sort_key(&RawContact::new("1"), None), "#");
    }

    #[test]
    fn synthesized_display_name_is_ignored() {
        let raw = RawContact::new("1").with_org("Acme");
        let display = DisplayName {
            given_name: vec!["Acme".to_string()],
            family_name: None,
            modified: true,
        };
        assert_eq!(build_sort_key(&raw, Some(&display)), "ACME#");
    }

    #[test]
    fn real_display_name_wins_over_raw_fields() {
        let raw = RawContact::new("1").with_given_name("ignored");
        let display = DisplayName {
            given_name: vec!["Ann".to_string()],
            family_name: Some(vec!["Lee".to_string()]),
            modified: false,
        };
        assert_eq!(build_sort_key(&raw, Some(&display)), "ANNLEE");
    }

    #[test]
    fn blank_display_name_falls_back_to_raw_fields() {
        let raw = RawContact::new("1").with_org("Acme");
        let display = DisplayName {
            given_name: vec![String::new()],
            family_name: Some(vec!["  ".to_string()]),
            modified: false,
        };
        assert_eq!(build_sort_key(&raw, Some(&display)), "ACME#");
    }

    #[test]
    fn blank_names_fall_back() {
        let raw = RawContact::new("1")
            .with_given_name("   ")
            .with_family_name("")
            .with_email(" ann@example.com ");
        assert_eq!(build_sort_key(&raw, None), "ANN@EXAMPLE.COM#");
    }

    #[test]
    fn sharp_s_expands_before_upper_casing() {
        let raw = RawContact::new("1").with_family_name("Weiß");
        assert_eq!(build_sort_key(&raw, None), "WEISS");
    }

    #[test]
    fn letters_without_decomposition_still_fold() {
        let raw = RawContact::new("1")
            .with_given_name("ŉ")
            .with_family_name("ẞ");
        let key = build_sort_key(&raw, None);
        assert_eq!(key, "'NSS");
        assert!(key.is_ascii());
    }

    #[test]
    fn ascii_folding() {
        assert_eq!(to_ascii("Ångström"), "Angstrom");
        assert_eq!(to_ascii("Straße"), "Strasse");
        assert_eq!(to_ascii("Łódź"), "Lodz");
        assert_eq!(to_ascii("Ωμέγα"), "Ωμεγα");
        assert_eq!(to_ascii("Йошкар"), "Йошкар");
    }
}
