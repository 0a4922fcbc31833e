//! Ordered API credential pool with a forward-only cursor

use std::fmt;

/// An API key or token. `Debug`/`Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building requests
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({self})")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if self.0.chars().count() > 8 {
            write!(f, "...{tail}")
        } else {
            f.write_str("***")
        }
    }
}

/// Credential rotator.
///
/// The list is fixed at construction. [`rotate`](Self::rotate) advances by one
/// and never wraps: once past the last credential the pool is depleted.
#[derive(Debug, Clone, Default)]
pub struct CredentialRotator {
    credentials: Vec<Credential>,
    current: usize,
}

impl CredentialRotator {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            current: 0,
        }
    }

    /// Pool for sources that need no credential
    pub fn empty() -> Self {
        Self::default()
    }

    /// Split a comma-separated list (`KEY1,KEY2`), skipping blanks
    pub fn from_list(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Credential::new)
                .collect(),
        )
    }

    /// Active credential, `None` when depleted or empty
    pub fn current(&self) -> Option<&Credential> {
        self.credentials.get(self.current)
    }

    /// Advance to the next credential; false when none remains
    pub fn rotate(&mut self) -> bool {
        if self.current < self.credentials.len() {
            self.current += 1;
        }
        let has_next = self.current < self.credentials.len();
        if has_next {
            log::warn!(
                "Rotating to credential {}/{}",
                self.current + 1,
                self.credentials.len()
            );
        }
        has_next
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn is_depleted(&self) -> bool {
        self.current >= self.credentials.len()
    }
}
