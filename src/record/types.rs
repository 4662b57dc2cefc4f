//! Record data model, patch and list query types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored user profile.
///
/// Every attribute is always present; the empty string stands in for
/// "not provided".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Record {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub password: String,
    pub email: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Build a fresh row for insertion. Both timestamps are set to `now`.
    pub fn new(id: String, attributes: NewRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name: attributes.first_name,
            last_name: attributes.last_name,
            nickname: attributes.nickname,
            password: attributes.password,
            email: attributes.email,
            country: attributes.country,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the present fields of a patch and bump `updated_at`.
    /// An empty patch leaves the row untouched and returns false.
    pub fn apply(&mut self, patch: &RecordPatch, now: DateTime<Utc>) -> bool {
        if patch.is_empty() {
            return false;
        }
        for (field, value) in patch.present_fields() {
            match field {
                RecordField::FirstName => self.first_name = value.to_string(),
                RecordField::LastName => self.last_name = value.to_string(),
                RecordField::Nickname => self.nickname = value.to_string(),
                RecordField::Password => self.password = value.to_string(),
                RecordField::Email => self.email = value.to_string(),
                RecordField::Country => self.country = value.to_string(),
                RecordField::Id => {}
            }
        }
        self.updated_at = now;
        true
    }

    /// Value of a filterable column
    pub fn field(&self, field: RecordField) -> &str {
        match field {
            RecordField::Id => &self.id,
            RecordField::FirstName => &self.first_name,
            RecordField::LastName => &self.last_name,
            RecordField::Nickname => &self.nickname,
            RecordField::Password => &self.password,
            RecordField::Email => &self.email,
            RecordField::Country => &self.country,
        }
    }
}

/// Attributes supplied on create. The id and timestamps are owned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewRecord {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub country: String,
}

impl NewRecord {
    /// First required attribute that is empty, in the fixed check order
    /// first_name, last_name, email.
    pub fn missing_required_field(&self) -> Option<RecordField> {
        [
            (RecordField::FirstName, &self.first_name),
            (RecordField::LastName, &self.last_name),
            (RecordField::Email, &self.email),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
    }
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.present_fields().next().is_none()
    }

    /// Present (column, new value) pairs in column order
    pub fn present_fields(&self) -> impl Iterator<Item = (RecordField, &str)> {
        [
            (RecordField::FirstName, &self.first_name),
            (RecordField::LastName, &self.last_name),
            (RecordField::Nickname, &self.nickname),
            (RecordField::Password, &self.password),
            (RecordField::Email, &self.email),
            (RecordField::Country, &self.country),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
    }
}

/// Columns of the `records` table that can be filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordField {
    Id,
    FirstName,
    LastName,
    Nickname,
    Password,
    Email,
    Country,
}

impl RecordField {
    pub fn column(&self) -> &'static str {
        match self {
            RecordField::Id => "id",
            RecordField::FirstName => "first_name",
            RecordField::LastName => "last_name",
            RecordField::Nickname => "nickname",
            RecordField::Password => "password",
            RecordField::Email => "email",
            RecordField::Country => "country",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Returned when a filter names a column that does not exist
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field '{0}'")]
pub struct UnknownField(pub String);

impl FromStr for RecordField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(RecordField::Id),
            "first_name" => Ok(RecordField::FirstName),
            "last_name" => Ok(RecordField::LastName),
            "nickname" => Ok(RecordField::Nickname),
            "password" => Ok(RecordField::Password),
            "email" => Ok(RecordField::Email),
            "country" => Ok(RecordField::Country),
            other => Err(UnknownField(other.to_string())),
        }
    }
}

/// Page window plus equality filters for a list call.
///
/// `page` is 1-based. Filters are combined with AND; an empty map matches
/// every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub filters: BTreeMap<RecordField, String>,
}

impl ListQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            filters: BTreeMap::new(),
        }
    }

    pub fn filter(mut self, field: RecordField, value: impl Into<String>) -> Self {
        self.filters.insert(field, value.into());
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| record.field(*field) == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> Record {
        Record::new(
            "id-1".to_string(),
            NewRecord {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                ..Default::default()
            },
            now,
        )
    }

    #[test]
    fn test_missing_required_field_order() {
        let empty = NewRecord::default();
        assert_eq!(empty.missing_required_field(), Some(RecordField::FirstName));

        let no_last = NewRecord {
            first_name: "a".to_string(),
            ..Default::default()
        };
        assert_eq!(no_last.missing_required_field(), Some(RecordField::LastName));

        let no_email = NewRecord {
            first_name: "a".to_string(),
            last_name: "b".to_string(),
            country: "de".to_string(),
            ..Default::default()
        };
        assert_eq!(no_email.missing_required_field(), Some(RecordField::Email));

        let complete = NewRecord {
            first_name: "a".to_string(),
            last_name: "b".to_string(),
            email: "a@b.com".to_string(),
            ..Default::default()
        };
        assert_eq!(complete.missing_required_field(), None);
    }

    #[test]
    fn test_apply_patch_only_touches_present_fields() {
        let created = Utc::now();
        let mut record = sample(created);
        let later = created + chrono::Duration::seconds(5);

        let patch = RecordPatch {
            first_name: Some("Augusta".to_string()),
            country: Some(String::new()),
            ..Default::default()
        };
        assert!(record.apply(&patch, later));

        assert_eq!(record.first_name, "Augusta");
        assert_eq!(record.last_name, "Lovelace");
        assert_eq!(record.country, "");
        assert_eq!(record.created_at, created);
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn test_empty_patch_leaves_row_untouched() {
        let created = Utc::now();
        let mut record = sample(created);
        let before = record.clone();

        assert!(RecordPatch::default().is_empty());
        assert!(!record.apply(&RecordPatch::default(), created + chrono::Duration::seconds(1)));
        assert_eq!(record, before);
    }

    #[test]
    fn test_field_parsing() {
        assert_eq!("email".parse::<RecordField>(), Ok(RecordField::Email));
        assert_eq!("id".parse::<RecordField>(), Ok(RecordField::Id));
        assert_eq!(
            "email; DROP TABLE records".parse::<RecordField>(),
            Err(UnknownField("email; DROP TABLE records".to_string()))
        );
    }

    #[test]
    fn test_list_query_window_and_filters() {
        let query = ListQuery::new(3, 10).filter(RecordField::LastName, "Lovelace");
        assert_eq!(query.offset(), 20);
        assert_eq!(query.limit(), 10);

        let record = sample(Utc::now());
        assert!(query.matches(&record));
        assert!(!query
            .clone()
            .filter(RecordField::FirstName, "Grace")
            .matches(&record));
        assert_eq!(ListQuery::new(1, 10).offset(), 0);
    }
}
