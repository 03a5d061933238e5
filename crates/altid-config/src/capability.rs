//! Optional service capabilities a deployment can insist on.
//!
//! Services hand optional handlers (input processing, default verb handling)
//! to the control session when it is built. A configuration lists which of
//! those handlers are mandatory; the session checks the list once and refuses
//! to start when one is absent.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// A handler a service may provide to the control session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Capability {
    /// Receives bytes written to a buffer's `input` file.
    Input,
    /// Receives `<verb> <buffer> <text>` lines for unregistered verbs.
    DefaultHandler,
}

/// Errors produced when parsing a [`CapabilitySet`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityParseError {
    /// A list entry did not name a known capability.
    #[error("unknown capability '{0}'")]
    Unknown(String),
}

/// Ordered, duplicate-free set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Builds an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capability, returning the updated set.
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Adds a capability in place.
    pub fn insert(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Reports whether the set contains `capability`.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Reports whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Capabilities in `self` that `provided` lacks, in declaration order.
    pub fn missing_from<'a>(
        &'a self,
        provided: &'a Self,
    ) -> impl Iterator<Item = Capability> + 'a {
        self.capabilities
            .iter()
            .copied()
            .filter(|capability| !provided.contains(*capability))
    }

    /// Iterates over the set.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for capability in &self.capabilities {
            if !first {
                formatter.write_str(",")?;
            }
            write!(formatter, "{capability}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for CapabilitySet {
    type Err = CapabilityParseError;

    /// Parses a comma separated list such as `input, default_handler`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                Capability::from_str(entry)
                    .map_err(|_| CapabilityParseError::Unknown(entry.to_owned()))
            })
            .collect()
    }
}
