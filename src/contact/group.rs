// Alphabet group classification and the fixed group ordering (favorites, Latin, Greek, Cyrillic, und).
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::contact::RawContact;

pub const FAVORITES: &str = "favorites";
pub const UNDEFINED: &str = "und";

const LATIN: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const GREEK: &str = "ΑΒΓΔΕΖΗΘΙΚΛΜΝΞΟΠΡΣΤΥΦΧΨΩ";
const CYRILLIC: &str = "АБВГДЂЕЁЖЗИЙЈКЛЉМНЊОПРСТЋУФХЦЧЏШЩЭЮЯ";

struct GroupOrder {
    letters: HashMap<char, u32>,
    undefined: u32,
}

static GROUP_ORDER: LazyLock<GroupOrder> = LazyLock::new(|| {
    let mut letters = HashMap::new();
    for (position, letter) in LATIN.chars().chain(GREEK.chars()).chain(CYRILLIC.chars()).enumerate() {
        letters.insert(letter, position as u32 + 1);
    }
    let undefined = letters.len() as u32 + 1;
    GroupOrder { letters, undefined }
});

/// Returns the group letter for `raw`: the upper-cased first character of its first family
/// name, when that letter is part of a known alphabet. Everything else is ungrouped.
pub fn classify(raw: &RawContact) -> Option<char> {
    let family = raw.family_name.as_ref()?.first()?;
    let first = family.chars().next()?;
    let mut upper = first.to_uppercase();
    let letter = upper.next()?;
    if upper.next().is_some() {
        return None;
    }
    GROUP_ORDER.letters.contains_key(&letter).then_some(letter)
}

/// Position of a group label in display order. `None` for labels outside the table.
pub fn group_rank(label: &str) -> Option<u32> {
    match label {
        FAVORITES => Some(0),
        UNDEFINED => Some(GROUP_ORDER.undefined),
        _ => {
            let mut chars = label.chars();
            let letter = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            GROUP_ORDER.letters.get(&letter).copied()
        }
    }
}

/// Orders group labels by rank; unknown labels go last, by label text.
pub fn compare_groups(a: &str, b: &str) -> Ordering {
    let rank = |label: &str| group_rank(label).unwrap_or(u32::MAX);
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}
