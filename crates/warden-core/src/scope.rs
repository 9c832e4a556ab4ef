//! Canonical scope sets.
//!
//! A scope arrives either as a single delimited string (`"read write"`,
//! `"read,write"`) or as a list of names. Both normalize to the same
//! deduplicated, order-insensitive set. Persisted form is the sorted names
//! joined by commas.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

/// Separator used in the persisted form.
const STORAGE_SEPARATOR: char = ',';

/// A normalized set of scope names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// An empty scope set.
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Normalize a whitespace- and/or comma-delimited scope string.
    pub fn parse(raw: &str) -> Self {
        raw.split(|c: char| c == STORAGE_SEPARATOR || c.is_whitespace())
            .collect()
    }

    /// Names present in both `self` and `allowed`.
    ///
    /// The result never contains a name absent from `allowed`. An empty
    /// result is valid; callers decide whether an unscoped credential is
    /// acceptable.
    #[must_use]
    pub fn intersect(&self, allowed: &Self) -> Self {
        Self(self.0.intersection(&allowed.0).cloned().collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma-joined form used for persistence and exact-match lookups.
    pub fn to_storage(&self) -> String {
        self.iter().collect::<Vec<_>>().join(",")
    }
}

/// Clip `requested` to what `allowed` permits.
pub fn intersect(requested: &ScopeSet, allowed: &ScopeSet) -> ScopeSet {
    requested.intersect(allowed)
}

impl<S: AsRef<str>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|name| name.as_ref().trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }
}

impl From<&str> for ScopeSet {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for ScopeSet {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl<S: AsRef<str>> From<&[S]> for ScopeSet {
    fn from(names: &[S]) -> Self {
        names.iter().collect()
    }
}

impl<S: AsRef<str>, const N: usize> From<[S; N]> for ScopeSet {
    fn from(names: [S; N]) -> Self {
        names.iter().collect()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iter().collect::<Vec<_>>().join(" "))
    }
}

impl Type<Sqlite> for ScopeSet {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for ScopeSet {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, BoxDynError> {
        <String as Encode<'q, Sqlite>>::encode(self.to_storage(), buf)
    }
}

impl<'r> Decode<'r, Sqlite> for ScopeSet {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&str as Decode<'r, Sqlite>>::decode(value)?;
        Ok(Self::parse(raw))
    }
}
