//! Branch naming.
//!
//! A proposal has exactly one `main` branch and at most one working branch per
//! contributor, named `contributor/{id}`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{ContributorId, TransitionError};

/// Name of the canonical branch.
pub const MAIN_BRANCH: &str = "main";

const CONTRIBUTOR_PREFIX: &str = "contributor/";

/// Name of a branch within a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BranchName {
    /// The canonical line of history.
    Main,
    /// A contributor's working line.
    Contributor(ContributorId),
}

impl BranchName {
    /// Working branch name for a contributor.
    pub fn working(contributor: ContributorId) -> Self {
        Self::Contributor(contributor)
    }

    /// Returns true for `main`.
    pub fn is_main(&self) -> bool {
        matches!(self, Self::Main)
    }

    /// The contributor owning this branch, if it is a working branch.
    pub fn owner(&self) -> Option<ContributorId> {
        match self {
            Self::Main => None,
            Self::Contributor(id) => Some(*id),
        }
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str(MAIN_BRANCH),
            Self::Contributor(id) => write!(f, "{CONTRIBUTOR_PREFIX}{}", id.get()),
        }
    }
}

impl FromStr for BranchName {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == MAIN_BRANCH {
            return Ok(Self::Main);
        }
        s.strip_prefix(CONTRIBUTOR_PREFIX)
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(|raw| Self::Contributor(ContributorId::new(raw)))
            .ok_or_else(|| TransitionError::InvalidBranchName(s.to_string()))
    }
}

impl Serialize for BranchName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BranchName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_display_and_parse() {
        let working = BranchName::working(ContributorId::new(9));
        assert_eq!(working.to_string(), "contributor/9");
        assert_eq!("contributor/9".parse::<BranchName>().unwrap(), working);
        assert_eq!("main".parse::<BranchName>().unwrap(), BranchName::Main);
    }

    #[test]
    fn test_invalid_branch_names() {
        assert!("feature/x".parse::<BranchName>().is_err());
        assert!("contributor/".parse::<BranchName>().is_err());
        assert!("contributor/abc".parse::<BranchName>().is_err());
    }

    #[test]
    fn test_branch_owner() {
        assert_eq!(BranchName::Main.owner(), None);
        assert_eq!(
            BranchName::working(ContributorId::new(2)).owner(),
            Some(ContributorId::new(2))
        );
    }
}
