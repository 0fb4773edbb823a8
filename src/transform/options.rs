//! Flag parsing for the transformer query parameter.
//!
//! A flag value such as `body|JSON|bearer` is lower-cased, split on `|`
//! and collected into an [`OptionSet`]. Tokens that do not name a known
//! transformation are dropped without error.

use std::fmt;

/// A single transformation selectable through the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Wrap the raw body into a single-key JSON object.
    Body,
    /// Force `Content-Type: application/json`.
    Json,
    /// Set `Authorization: Bearer <token>` from the token query parameter.
    Bearer,
}

impl Flag {
    /// All flags, in the order they are applied.
    pub const ALL: [Flag; 3] = [Flag::Body, Flag::Json, Flag::Bearer];

    /// Parse an already lower-cased token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "body" => Some(Flag::Body),
            "json" => Some(Flag::Json),
            "bearer" => Some(Flag::Bearer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Flag::Body => "body",
            Flag::Json => "json",
            Flag::Bearer => "bearer",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Flag::Body => 0b001,
            Flag::Json => 0b010,
            Flag::Bearer => 0b100,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of flags active for one request.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionSet {
    bits: u8,
}

impl OptionSet {
    /// An empty set: the request passes through untouched.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a raw flag value. Empty input yields an empty set.
    pub fn parse(raw: &str) -> Self {
        raw.to_lowercase()
            .split('|')
            .filter_map(Flag::from_token)
            .collect()
    }

    pub fn insert(&mut self, flag: Flag) {
        self.bits |= flag.bit();
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Active flags in application order.
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::ALL.into_iter().filter(|flag| self.contains(*flag))
    }
}

impl FromIterator<Flag> for OptionSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut set = OptionSet::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

impl fmt::Debug for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
