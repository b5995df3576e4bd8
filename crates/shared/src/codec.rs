//! Text codec for control addresses: `bank:<page>-<bank>` and `trigger:<id>`.
//!
//! Only the shape is parsed here. Range validation against the configured
//! grid is the responsibility of the caller.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::ControlId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseControlIdError {
    #[error("missing address scheme in '{0}': expected 'bank:' or 'trigger:'")]
    MissingScheme(String),
    #[error("unknown address scheme '{0}'")]
    UnknownScheme(String),
    #[error("malformed bank address '{0}': expected '<page>-<bank>'")]
    MalformedBank(String),
    #[error("empty trigger id")]
    EmptyTriggerId,
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bank { page, bank } => write!(f, "bank:{page}-{bank}"),
            Self::Trigger { id } => write!(f, "trigger:{id}"),
        }
    }
}

impl FromStr for ControlId {
    type Err = ParseControlIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| ParseControlIdError::MissingScheme(s.to_owned()))?;
        match scheme {
            "bank" => {
                let (page, bank) = rest
                    .split_once('-')
                    .ok_or_else(|| ParseControlIdError::MalformedBank(rest.to_owned()))?;
                let page: u32 = page
                    .parse()
                    .map_err(|_| ParseControlIdError::MalformedBank(rest.to_owned()))?;
                let bank: u32 = bank
                    .parse()
                    .map_err(|_| ParseControlIdError::MalformedBank(rest.to_owned()))?;
                Ok(ControlId::Bank { page, bank })
            }
            "trigger" => {
                if rest.is_empty() {
                    return Err(ParseControlIdError::EmptyTriggerId);
                }
                Ok(ControlId::Trigger {
                    id: rest.to_owned(),
                })
            }
            other => Err(ParseControlIdError::UnknownScheme(other.to_owned())),
        }
    }
}
