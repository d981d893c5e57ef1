use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// How removed aggregates and superseded child rows leave the database.
///
/// `Hard` issues `DELETE` statements (child rows cascade through their foreign keys).
/// `Soft` stamps `deleted_at` on the aggregate and its child rows; reads filter them out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    #[default]
    Hard,
    Soft,
}

impl DeletePolicy {
    pub fn is_soft(&self) -> bool {
        matches!(self, DeletePolicy::Soft)
    }
}

impl FromStr for DeletePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hard" => Ok(DeletePolicy::Hard),
            "soft" => Ok(DeletePolicy::Soft),
            _ => Err(anyhow::anyhow!("Invalid delete policy: {}", s)),
        }
    }
}

impl Display for DeletePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DeletePolicy::Hard => write!(f, "hard"),
            DeletePolicy::Soft => write!(f, "soft"),
        }
    }
}
