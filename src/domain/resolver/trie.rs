//! Character trie keyed by command name

use std::collections::BTreeMap;

use crate::domain::entities::Command;

#[derive(Debug, Default, Clone)]
struct Node {
    value: Option<Command>,
    children: BTreeMap<char, Node>,
}

/// Prefix tree mapping each command's character sequence to the command.
///
/// Lookups cost O(length of key). Enumeration is depth-first in character
/// order, so a key is always visited before its extensions (`hel` before
/// `hello`).
#[derive(Debug, Default, Clone)]
pub struct CommandTrie {
    root: Node,
    len: usize,
}

impl CommandTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `command` under `key`, returning the command previously stored
    /// there, if any.
    pub fn insert(&mut self, key: &str, command: Command) -> Option<Command> {
        let mut node = &mut self.root;
        for ch in key.chars() {
            node = node.children.entry(ch).or_default();
        }

        let previous = node.value.replace(command);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    pub fn get(&self, key: &str) -> Option<&Command> {
        let mut node = &self.root;
        for ch in key.chars() {
            node = node.children.get(&ch)?;
        }
        node.value.as_ref()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: vec![(String::new(), &self.root)],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Depth-first walk over `(key, command)` pairs.
pub struct Iter<'a> {
    stack: Vec<(String, &'a Node)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (String, &'a Command);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((key, node)) = self.stack.pop() {
            // Reverse so the smallest child is popped first.
            for (ch, child) in node.children.iter().rev() {
                let mut child_key = key.clone();
                child_key.push(*ch);
                self.stack.push((child_key, child));
            }

            if let Some(command) = &node.value {
                return Some((key, command));
            }
        }
        None
    }
}

impl<'a> IntoIterator for &'a CommandTrie {
    type Item = (String, &'a Command);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
