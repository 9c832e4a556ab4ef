//! Resource owner identities.
//!
//! An identity is an opaque handle supplied by the embedding application:
//! either a string (`"user42"`) or an integer (`42`). The two are distinct,
//! so `"42"` and `42` never match each other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type, ValueRef};

use crate::error::{Error, Result};

/// The resource owner on whose behalf access is granted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Numeric(i64),
    Text(String),
}

impl Identity {
    /// Reject identities that carry no information.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Text(s) if s.trim().is_empty() => {
                Err(Error::Identity("identity must not be empty".into()))
            }
            _ => Ok(()),
        }
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Identity {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

/// Parses command-line style input: all-digit values become numeric.
impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let identity = s
            .parse::<i64>()
            .map_or_else(|_| Self::Text(s.to_string()), Self::Numeric);
        identity.validate()?;
        Ok(identity)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// Stored in an untyped column: integers as INTEGER, strings as TEXT.

impl Type<Sqlite> for Identity {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty) || <i64 as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for Identity {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> std::result::Result<IsNull, BoxDynError> {
        match self {
            Self::Numeric(n) => <i64 as Encode<'q, Sqlite>>::encode(*n, buf),
            Self::Text(s) => <String as Encode<'q, Sqlite>>::encode(s.clone(), buf),
        }
    }
}

impl<'r> Decode<'r, Sqlite> for Identity {
    fn decode(value: SqliteValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let numeric = <i64 as Type<Sqlite>>::compatible(&value.type_info());
        if numeric {
            Ok(Self::Numeric(<i64 as Decode<'r, Sqlite>>::decode(value)?))
        } else {
            Ok(Self::Text(<String as Decode<'r, Sqlite>>::decode(value)?))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        assert!(Identity::from("").validate().is_err());
        assert!(Identity::from("   ").validate().is_err());
        assert!(Identity::from("user42").validate().is_ok());
        assert!(Identity::from(0).validate().is_ok());
    }

    #[test]
    fn text_and_numeric_are_distinct() {
        assert_ne!(Identity::from("42"), Identity::from(42));
    }

    #[test]
    fn from_str_prefers_numeric() {
        assert_eq!("42".parse::<Identity>().unwrap(), Identity::Numeric(42));
        assert_eq!(
            "alice".parse::<Identity>().unwrap(),
            Identity::Text("alice".into())
        );
        assert!("".parse::<Identity>().is_err());
    }

    #[test]
    fn serde_is_untagged() {
        assert_eq!(serde_json::to_string(&Identity::from(7)).unwrap(), "7");
        assert_eq!(
            serde_json::from_str::<Identity>(r#""bob""#).unwrap(),
            Identity::from("bob")
        );
    }
}
