//! Chat participant roles.
//!
//! Every message is exchanged between two of the three roles below, and a
//! session always pairs the merchant side with exactly one counterpart.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// A chat participant role.
///
/// Wire and storage form is upper-case (`MERCHANT`, `CUSTOMER`, `COURIER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Merchant,
    Customer,
    Courier,
}

impl Role {
    /// Upper-case storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Merchant => "MERCHANT",
            Role::Customer => "CUSTOMER",
            Role::Courier => "COURIER",
        }
    }

    /// The non-merchant side of a session, if this role is one.
    pub fn counterpart(self) -> Option<CounterpartRole> {
        match self {
            Role::Merchant => None,
            Role::Customer => Some(CounterpartRole::Customer),
            Role::Courier => Some(CounterpartRole::Courier),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts any casing and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MERCHANT" => Ok(Role::Merchant),
            "CUSTOMER" => Ok(Role::Customer),
            "COURIER" => Ok(Role::Courier),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// The role of a session's counterpart: anyone but the merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CounterpartRole {
    Customer,
    Courier,
}

impl CounterpartRole {
    pub fn as_str(&self) -> &'static str {
        self.role().as_str()
    }

    pub fn role(self) -> Role {
        match self {
            CounterpartRole::Customer => Role::Customer,
            CounterpartRole::Courier => Role::Courier,
        }
    }
}

impl From<CounterpartRole> for Role {
    fn from(role: CounterpartRole) -> Self {
        role.role()
    }
}

impl TryFrom<Role> for CounterpartRole {
    type Error = String;

    fn try_from(role: Role) -> Result<Self, Self::Error> {
        role.counterpart()
            .ok_or_else(|| format!("'{role}' is not a counterpart role"))
    }
}

impl fmt::Display for CounterpartRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterpartRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let role: Role = s.parse()?;
        CounterpartRole::try_from(role)
    }
}
