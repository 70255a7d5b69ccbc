use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_DOMAIN: &str = "";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QualifiedIdError {
    #[error("invalid qualified id format: {0}")]
    InvalidFormat(String),
}

/// A domain-qualified identifier, written as `id@domain`.
///
/// Used for conversations and users alike. An empty domain means the
/// backend runs without federation and the id is only meaningful locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedId {
    pub id: String,
    #[serde(default)]
    pub domain: String,
}

impl QualifiedId {
    pub fn new(id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
        }
    }

    /// An id with no domain part.
    pub fn local(id: impl Into<String>) -> Self {
        Self::new(id, DEFAULT_DOMAIN)
    }

    pub fn is_federated(&self) -> bool {
        !self.domain.is_empty()
    }

    /// Identity comparison across federated and non-federated ids.
    ///
    /// The local parts must be equal. Domains are only compared when both
    /// sides carry one, so `abc` matches `abc@wire.com`.
    pub fn matches(&self, other: &QualifiedId) -> bool {
        self.id == other.id
            && (self.domain.is_empty() || other.domain.is_empty() || self.domain == other.domain)
    }
}

impl FromStr for QualifiedId {
    type Err = QualifiedIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, domain) = match s.split_once('@') {
            Some((id, domain)) => (id, domain),
            None => (s, DEFAULT_DOMAIN),
        };

        if id.is_empty() || domain.contains('@') {
            return Err(QualifiedIdError::InvalidFormat(s.to_string()));
        }

        Ok(QualifiedId::new(id, domain))
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.domain.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}@{}", self.id, self.domain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let qid: QualifiedId = "conv-1@wire.example".parse().unwrap();
        assert_eq!(qid.id, "conv-1");
        assert_eq!(qid.domain, "wire.example");
        assert_eq!(qid.to_string(), "conv-1@wire.example");

        let local: QualifiedId = "conv-2".parse().unwrap();
        assert!(!local.is_federated());
        assert_eq!(local.to_string(), "conv-2");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<QualifiedId>().is_err());
        assert!("@wire.example".parse::<QualifiedId>().is_err());
        assert!("a@b@c".parse::<QualifiedId>().is_err());
    }

    #[test]
    fn test_matches_ignores_missing_domain() {
        let federated = QualifiedId::new("abc", "wire.example");
        let local = QualifiedId::local("abc");
        let other_domain = QualifiedId::new("abc", "other.example");

        assert!(federated.matches(&local));
        assert!(local.matches(&federated));
        assert!(!federated.matches(&other_domain));
        assert!(!federated.matches(&QualifiedId::new("abd", "wire.example")));
    }
}
