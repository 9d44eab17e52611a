//! Topic Trie for subscription matching
//!
//! A prefix tree keyed by topic level. Each node holds the value registered
//! for the filter ending at that node, a `+` child, and the value registered
//! for `#` below it. Branches left without values are pruned on removal so
//! that churn of short-lived filters does not grow the tree.
//!
//! Only a trailing `#` addresses the multi-level slot. A `#` anywhere else is
//! stored as a plain level, so lookups stay exact-match on the whole filter
//! and such entries can never match a topic name.

use ahash::AHashMap;
use compact_str::CompactString;
use smallvec::SmallVec;

use super::validation::{LEVEL_SEPARATOR, MULTI_LEVEL_WILDCARD, SINGLE_LEVEL_WILDCARD};

#[derive(Debug)]
struct TrieNode<V> {
    /// Value for a filter ending exactly here
    value: Option<V>,
    children: AHashMap<CompactString, TrieNode<V>>,
    /// `+` child
    single_wildcard: Option<Box<TrieNode<V>>>,
    /// Value for `<this level>/#`
    multi_wildcard: Option<V>,
}

impl<V> TrieNode<V> {
    fn new() -> Self {
        Self {
            value: None,
            children: AHashMap::with_capacity(4),
            single_wildcard: None,
            multi_wildcard: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.multi_wildcard.is_none()
            && self.single_wildcard.is_none()
            && self.children.is_empty()
    }
}

impl<V> Default for TrieNode<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Topic filter index
#[derive(Debug)]
pub struct TopicTrie<V> {
    root: TrieNode<V>,
}

impl<V> TopicTrie<V> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Get the value stored for a filter, inserting one built by `init` if absent
    pub fn get_or_insert_with<F>(&mut self, filter: &str, init: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let mut node = &mut self.root;
        let mut levels = filter.split(LEVEL_SEPARATOR).peekable();
        while let Some(level) = levels.next() {
            if level == MULTI_LEVEL_WILDCARD && levels.peek().is_none() {
                return node.multi_wildcard.get_or_insert_with(init);
            }
            node = if level == SINGLE_LEVEL_WILDCARD {
                &mut **node
                    .single_wildcard
                    .get_or_insert_with(|| Box::new(TrieNode::new()))
            } else {
                node.children.entry(CompactString::new(level)).or_default()
            };
        }
        node.value.get_or_insert_with(init)
    }

    /// Get a mutable reference to the value stored for a filter
    pub fn get_mut(&mut self, filter: &str) -> Option<&mut V> {
        let mut node = &mut self.root;
        let mut levels = filter.split(LEVEL_SEPARATOR).peekable();
        while let Some(level) = levels.next() {
            if level == MULTI_LEVEL_WILDCARD && levels.peek().is_none() {
                return node.multi_wildcard.as_mut();
            }
            node = if level == SINGLE_LEVEL_WILDCARD {
                &mut **node.single_wildcard.as_mut()?
            } else {
                node.children.get_mut(level)?
            };
        }
        node.value.as_mut()
    }

    /// Remove the value stored for a filter, pruning emptied branches
    pub fn remove(&mut self, filter: &str) -> Option<V> {
        let levels: SmallVec<[&str; 8]> = filter.split(LEVEL_SEPARATOR).collect();
        Self::remove_recursive(&mut self.root, &levels)
    }

    fn remove_recursive(node: &mut TrieNode<V>, levels: &[&str]) -> Option<V> {
        let Some((&level, rest)) = levels.split_first() else {
            return node.value.take();
        };

        if level == MULTI_LEVEL_WILDCARD && rest.is_empty() {
            return node.multi_wildcard.take();
        }

        if level == SINGLE_LEVEL_WILDCARD {
            let child = node.single_wildcard.as_mut()?;
            let removed = Self::remove_recursive(child, rest);
            if child.is_empty() {
                node.single_wildcard = None;
            }
            removed
        } else {
            let child = node.children.get_mut(level)?;
            let removed = Self::remove_recursive(child, rest);
            if child.is_empty() {
                node.children.remove(level);
            }
            removed
        }
    }

    /// Keep only the values for which `keep` returns true
    ///
    /// `keep` may mutate the value in place (e.g. filter a list) before deciding.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&mut V) -> bool,
    {
        Self::retain_recursive(&mut self.root, &mut keep);
    }

    fn retain_recursive<F>(node: &mut TrieNode<V>, keep: &mut F)
    where
        F: FnMut(&mut V) -> bool,
    {
        if let Some(ref mut v) = node.value {
            if !keep(v) {
                node.value = None;
            }
        }

        if let Some(ref mut v) = node.multi_wildcard {
            if !keep(v) {
                node.multi_wildcard = None;
            }
        }

        if let Some(ref mut child) = node.single_wildcard {
            Self::retain_recursive(child, keep);
            if child.is_empty() {
                node.single_wildcard = None;
            }
        }

        node.children.retain(|_, child| {
            Self::retain_recursive(child, keep);
            !child.is_empty()
        });
    }

    /// Visit every stored value
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&V),
    {
        Self::for_each_recursive(&self.root, &mut f);
    }

    fn for_each_recursive<F>(node: &TrieNode<V>, f: &mut F)
    where
        F: FnMut(&V),
    {
        if let Some(ref v) = node.value {
            f(v);
        }
        if let Some(ref v) = node.multi_wildcard {
            f(v);
        }
        if let Some(ref child) = node.single_wildcard {
            Self::for_each_recursive(child, f);
        }
        for child in node.children.values() {
            Self::for_each_recursive(child, f);
        }
    }

    /// Visit the value of every filter matching a topic name
    pub fn matches<F>(&self, topic: &str, mut callback: F)
    where
        F: FnMut(&V),
    {
        // $-topics don't match filters starting with + or #
        let is_system_topic = topic.starts_with('$');

        let levels: SmallVec<[&str; 8]> = topic.split(LEVEL_SEPARATOR).collect();
        Self::matches_recursive(&self.root, &levels, 0, is_system_topic, &mut callback);
    }

    fn matches_recursive<F>(
        node: &TrieNode<V>,
        levels: &[&str],
        index: usize,
        is_system_topic: bool,
        callback: &mut F,
    ) where
        F: FnMut(&V),
    {
        let wildcards_allowed = !(is_system_topic && index == 0);

        // `#` covers this level's parent too, so check it before the end test
        if wildcards_allowed {
            if let Some(ref v) = node.multi_wildcard {
                callback(v);
            }
        }

        if index >= levels.len() {
            if let Some(ref v) = node.value {
                callback(v);
            }
            return;
        }

        if wildcards_allowed {
            if let Some(ref child) = node.single_wildcard {
                Self::matches_recursive(child, levels, index + 1, is_system_topic, callback);
            }
        }

        if let Some(child) = node.children.get(levels[index]) {
            Self::matches_recursive(child, levels, index + 1, is_system_topic, callback);
        }
    }
}

impl<V> Default for TopicTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}
