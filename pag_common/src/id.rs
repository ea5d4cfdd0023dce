use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

//--------------------------------------        Id        ------------------------------------------------------------
/// An opaque identifier with a distinguished null value.
///
/// The empty string is the null id. Ordering is the lexicographic order of the canonical string form, which is
/// stable and total, and places the null id before every other id.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// The null id.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_some(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Into<String>> From<S> for Id {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl FromStr for Id {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn null_id_sorts_first() {
        let mut ids = vec![Id::from("b"), Id::from("a"), Id::null()];
        ids.sort();
        assert_eq!(ids[0], Id::null());
        assert_eq!(ids[1], Id::from("a"));
    }

    #[test]
    fn null_predicates() {
        assert!(Id::null().is_null());
        assert!(!Id::null().is_some());
        assert!(Id::from("x").is_some());
    }
}
