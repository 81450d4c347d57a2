// Raw directory entry -> canonical ContactRecord.
use crate::contact::group::classify;
use crate::contact::sort_key::build_sort_key;
use crate::contact::{ContactRecord, DisplayName, RawContact, first_entry};

/// Placeholder shown for contacts with no name, organization, phone, or email.
pub const NO_NAME: &str = "noName";

/// True when the first given or first family name is non-blank.
pub fn has_name(raw: &RawContact) -> bool {
    let filled = |list: Option<&Vec<String>>| {
        first_entry(list).is_some_and(|value| !value.trim().is_empty())
    };
    filled(raw.given_name.as_ref()) || filled(raw.family_name.as_ref())
}

/// The name shown for a contact. Real names are copied through; otherwise the first
/// organization, phone, or email stands in as the given name and `modified` is set.
pub fn display_name(raw: &RawContact) -> DisplayName {
    if has_name(raw) {
        return DisplayName {
            given_name: raw.given_name.clone().unwrap_or_default(),
            family_name: raw.family_name.clone(),
            modified: false,
        };
    }

    let fallback = first_filled(raw.org.iter().flatten().map(String::as_str))
        .or_else(|| first_filled(raw.tel.iter().flatten().map(|field| field.value())))
        .or_else(|| first_filled(raw.email.iter().flatten().map(|field| field.value())))
        .unwrap_or(NO_NAME);
    DisplayName {
        given_name: vec![fallback.to_string()],
        family_name: None,
        modified: true,
    }
}

/// Derives the stored record. Pure: the same input always yields the same record.
pub fn normalize(raw: &RawContact) -> ContactRecord {
    let display_name = display_name(raw);
    let sort_key = build_sort_key(raw, Some(&display_name));
    ContactRecord {
        sort_key: vec![sort_key],
        group: classify(raw),
        org: first_entry(raw.org.as_ref())
            .filter(|org| !org.is_empty())
            .map(str::to_string),
        id: raw.id.clone(),
        display_name,
    }
}

// Only the first entry counts; a blank first entry skips the whole field.
fn first_filled<'a>(mut values: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    values.next().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{NO_NAME, display_name, has_name, normalize};
    use crate::contact::RawContact;

    #[test]
    fn named_contact_keeps_its_names() {
        let raw = RawContact::new("1")
            .with_given_name("Ann")
            .with_family_name("Lee");
        let record = normalize(&raw);
        assert_eq!(record.display_name.given_name, vec!["Ann".to_string()]);
        assert_eq!(record.display_name.family_name, Some(vec!["Lee".to_string()]));
        assert!(!record.display_name.modified);
        assert_eq!(record.sort_key, vec!["ANNLEE".to_string()]);
        assert_eq!(record.group, Some('L'));
        assert_eq!(record.org, None);
        assert_eq!(record.id, "1");
    }

    #[test]
    fn organization_stands_in_for_name() {
        let raw = RawContact::new("1").with_org("Acme").with_tel("555");
        let record = normalize(&raw);
        assert_eq!(record.display_name.given_name, vec!["Acme".to_string()]);
        assert!(record.display_name.modified);
        assert_eq!(record.display_name.family_name, None);
        assert_eq!(record.sort_key, vec!["ACME555#".to_string()]);
        assert_eq!(record.group, None);
        assert_eq!(record.org.as_deref(), Some("Acme"));
    }

    #[test]
    fn phone_then_email_then_placeholder() {
        let raw = RawContact::new("1").with_tel("555").with_email("a@b.c");
        assert_eq!(display_name(&raw).given_name, vec!["555".to_string()]);

        let raw = RawContact::new("1").with_email("a@b.c");
        assert_eq!(display_name(&raw).given_name, vec!["a@b.c".to_string()]);

        let record = normalize(&RawContact::new("1"));
        assert_eq!(record.display_name.given_name, vec![NO_NAME.to_string()]);
        assert!(record.display_name.modified);
        assert_eq!(record.sort_key, vec!["#".to_string()]);
    }

    #[test]
    fn blank_fields_are_skipped() {
        let raw = RawContact::new("1")
            .with_given_name(" ")
            .with_org("")
            .with_email("x@y.z");
        assert!(!has_name(&raw));
        let record = normalize(&raw);
        assert_eq!(record.display_name.given_name, vec!["x@y.z".to_string()]);
        assert_eq!(record.org, None);
    }

    #[test]
    fn normalization_is_deterministic() {
        let raw = RawContact::new("9")
            .with_family_name("Жуков")
            .with_email("g@example.ru");
        assert_eq!(normalize(&raw), normalize(&raw));
        assert_eq!(normalize(&raw).group, Some('Ж'));
    }
}
