//! Command resolution - exact lookup with fuzzy fallback
//!
//! The resolver keeps the known commands in a [`CommandTrie`] behind an
//! `Arc`. Readers clone the pointer under a short read lock and search
//! without holding it; a rebuilt index replaces the old one in one store.

pub mod distance;
pub mod trie;

use std::sync::{Arc, PoisonError, RwLock};

use crate::application::errors::ResolverError;
use crate::domain::entities::Command;

pub use distance::levenshtein;
pub use trie::CommandTrie;

/// Commands strictly closer than this edit distance are fuzzy candidates.
pub const MAX_DISTANCE: usize = 3;

/// Outcome of resolving a command token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub candidates: Vec<Command>,
    pub exact: bool,
}

impl Resolution {
    fn exact(command: Command) -> Self {
        Self {
            candidates: vec![command],
            exact: true,
        }
    }

    fn fuzzy(candidates: Vec<Command>) -> Self {
        Self {
            candidates,
            exact: false,
        }
    }

    /// The matched command, only for an exact resolution.
    pub fn command(&self) -> Option<&Command> {
        if self.exact {
            self.candidates.first()
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Maps raw command tokens to known commands.
pub struct CommandResolver {
    index: RwLock<Arc<CommandTrie>>,
}

impl CommandResolver {
    pub fn new(commands: impl IntoIterator<Item = Command>) -> Result<Self, ResolverError> {
        let index = Self::build_index(commands)?;
        tracing::debug!("Command index built with {} commands", index.len());

        Ok(Self {
            index: RwLock::new(Arc::new(index)),
        })
    }

    /// Resolver over [`Command::builtin`].
    pub fn builtin() -> Result<Self, ResolverError> {
        Self::new(Command::builtin())
    }

    fn build_index(commands: impl IntoIterator<Item = Command>) -> Result<CommandTrie, ResolverError> {
        let mut index = CommandTrie::new();
        for command in commands {
            if command.as_str().is_empty() {
                return Err(ResolverError::EmptyName);
            }
            let key = command.as_str().to_string();
            if index.insert(&key, command).is_some() {
                return Err(ResolverError::Duplicate(key));
            }
        }

        if index.is_empty() {
            return Err(ResolverError::EmptyCommandSet);
        }
        Ok(index)
    }

    /// Build a new index off to the side and publish it in one store.
    ///
    /// Concurrent `resolve` calls see either the old or the new index in
    /// full. On error the current index stays in place.
    pub fn rebuild(&self, commands: impl IntoIterator<Item = Command>) -> Result<(), ResolverError> {
        let index = Self::build_index(commands)?;
        tracing::info!("Command index rebuilt with {} commands", index.len());
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
        Ok(())
    }

    fn load(&self) -> Arc<CommandTrie> {
        Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Known commands in index order.
    pub fn commands(&self) -> Vec<Command> {
        self.load().iter().map(|(_, command)| command.clone()).collect()
    }

    /// Resolve `token` to an exact match, or to every command within
    /// [`MAX_DISTANCE`] edits of it or starting with it.
    ///
    /// Fuzzy candidates are ordered by ascending distance; ties keep index
    /// order. Comparison is case-sensitive and the empty token is not
    /// special-cased.
    pub fn resolve(&self, token: &str) -> Resolution {
        let index = self.load();
        if let Some(command) = index.get(token) {
            return Resolution::exact(command.clone());
        }

        let mut scored: Vec<(usize, Command)> = index
            .iter()
            .filter_map(|(key, command)| {
                let distance = levenshtein(token, &key);
                (distance < MAX_DISTANCE || key.starts_with(token))
                    .then(|| (distance, command.clone()))
            })
            .collect();
        scored.sort_by_key(|(distance, _)| *distance);

        Resolution::fuzzy(scored.into_iter().map(|(_, command)| command).collect())
    }
}
