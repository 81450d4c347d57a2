//! Purpose: Contact record shapes, from raw directory entries to the canonical stored form.
//! Exports: `RawContact`, `ContactField`, `DisplayName`, `ContactRecord`, plus the
//! normalization, sort-key, grouping, and store submodules.
//! Role: Domain layer between the contact source and the generic store engine.
//! Invariants: `ContactRecord::sort_key` always holds exactly one entry.
//! Invariants: Serialized field names match the persisted camelCase record format.
use serde::{Deserialize, Serialize};

pub mod group;
pub mod normalize;
pub mod sort_key;
pub mod store;

pub use group::{FAVORITES, UNDEFINED, classify, compare_groups, group_rank};
pub use normalize::{display_name, has_name, normalize};
pub use sort_key::{build_sort_key, to_ascii};
pub use store::{ContactCursor, ContactStore, contact_schema};

/// A phone number or email address as delivered by the directory: either a bare string or
/// an object carrying `value` and optional `type` labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContactField {
    Plain(String),
    Typed {
        value: String,
        #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
        kinds: Vec<String>,
    },
}

impl ContactField {
    pub fn new(value: impl Into<String>) -> Self {
        ContactField::Typed {
            value: value.into(),
            kinds: Vec::new(),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ContactField::Plain(value) => value,
            ContactField::Typed { value, .. } => value,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tel: Option<Vec<ContactField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Vec<ContactField>>,
}

impl RawContact {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_given_name(mut self, name: impl Into<String>) -> Self {
        self.given_name.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    pub fn with_family_name(mut self, name: impl Into<String>) -> Self {
        self.family_name.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org.get_or_insert_with(Vec::new).push(org.into());
        self
    }

    pub fn with_tel(mut self, tel: impl Into<String>) -> Self {
        self.tel.get_or_insert_with(Vec::new).push(ContactField::new(tel));
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email.get_or_insert_with(Vec::new).push(ContactField::new(email));
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayName {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given_name: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<Vec<String>>,
    /// Set when no real name existed and a fallback field (or `noName`) was used.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub modified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub display_name: DisplayName,
    pub sort_key: Vec<String>,
    pub group: Option<char>,
    pub org: Option<String>,
    pub id: String,
}

impl ContactRecord {
    pub fn order_string(&self) -> &str {
        self.sort_key.first().map(String::as_str).unwrap_or_default()
    }
}

pub(crate) fn first_entry(list: Option<&Vec<String>>) -> Option<&str> {
    list.and_then(|items| items.first()).map(String::as_str)
}
