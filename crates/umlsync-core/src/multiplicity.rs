//! Multiplicity grammar and member descriptors.
//!
//! Multiplicities are `"<lower>..<upper>"` or a bare integer. `*` as upper
//! bound means unbounded; XMI spells the same thing `-1`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound of a multiplicity range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Upper {
    Bounded(u32),
    Unbounded,
}

impl Upper {
    /// Value as written into `LiteralUnlimitedNatural` (`-1` = unbounded)
    pub fn to_xmi(self) -> String {
        match self {
            Upper::Bounded(n) => n.to_string(),
            Upper::Unbounded => "-1".to_string(),
        }
    }
}

impl fmt::Display for Upper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upper::Bounded(n) => write!(f, "{n}"),
            Upper::Unbounded => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultiplicityError {
    #[error("empty multiplicity")]
    Empty,
    #[error("'*' alone is not a multiplicity; use '0..*'")]
    BareStar,
    #[error("lower bound must be a non-negative integer, got '{0}'")]
    InvalidLower(String),
    #[error("upper bound must be a non-negative integer or '*', got '{0}'")]
    InvalidUpper(String),
    #[error("lower bound {lower} exceeds upper bound {upper}")]
    Inverted { lower: u32, upper: u32 },
}

/// A parsed multiplicity range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Multiplicity {
    pub lower: u32,
    pub upper: Upper,
}

impl Multiplicity {
    pub const ONE: Multiplicity = Multiplicity { lower: 1, upper: Upper::Bounded(1) };
    pub const MANY: Multiplicity = Multiplicity { lower: 0, upper: Upper::Unbounded };

    pub fn new(lower: u32, upper: Upper) -> Result<Self, MultiplicityError> {
        if let Upper::Bounded(u) = upper {
            if lower > u {
                return Err(MultiplicityError::Inverted { lower, upper: u });
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn parse(input: &str) -> Result<Self, MultiplicityError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MultiplicityError::Empty);
        }
        if input == "*" {
            return Err(MultiplicityError::BareStar);
        }

        match input.split_once("..") {
            Some((lower, upper)) => {
                let lower = parse_lower(lower.trim())?;
                let upper = parse_upper(upper.trim())?;
                Self::new(lower, upper)
            }
            None => {
                let n = parse_lower(input)?;
                Ok(Self { lower: n, upper: Upper::Bounded(n) })
            }
        }
    }

    /// Build from the XMI `lowerValue`/`upperValue` literals
    pub fn from_xmi(lower: &str, upper: &str) -> Result<Self, MultiplicityError> {
        let lower = parse_lower(lower.trim())?;
        let upper = parse_upper(upper.trim())?;
        Self::new(lower, upper)
    }
}

fn parse_lower(text: &str) -> Result<u32, MultiplicityError> {
    text.parse::<u32>()
        .map_err(|_| MultiplicityError::InvalidLower(text.to_string()))
}

fn parse_upper(text: &str) -> Result<Upper, MultiplicityError> {
    match text {
        "*" | "-1" => Ok(Upper::Unbounded),
        _ => text
            .parse::<u32>()
            .map(Upper::Bounded)
            .map_err(|_| MultiplicityError::InvalidUpper(text.to_string())),
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.lower, self.upper)
    }
}

impl FromStr for Multiplicity {
    type Err = MultiplicityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Attribute or method descriptor, `name:type`.
///
/// Splits on the first `:` so `"+ run(): Result<T, E>"` keeps its whole
/// return type. `Display` renders the canonical `name: type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub kind: String,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { name: name.into(), kind: kind.into() }
    }

    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((name, kind)) => Self::new(name.trim(), kind.trim()),
            None => Self::new(text.trim(), ""),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.kind)
        }
    }
}
