//! Input handling.
//!
//! Device handling lives outside this crate. What arrives here are key names
//! with press/release edges, possibly with OS key-repeat. Only real edges are
//! worth a message to the server.

use std::collections::BTreeSet;

use crawl_shared::net::KeyAction;

/// A key edge to forward to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEdge {
    pub key: String,
    pub action: KeyAction,
}

/// Tracks held keys and filters repeats.
#[derive(Debug, Default)]
pub struct InputTracker {
    held: BTreeSet<String>,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the edge to send, or `None` for a repeat.
    pub fn press(&mut self, key: &str) -> Option<KeyEdge> {
        self.held.insert(key.to_string()).then(|| KeyEdge {
            key: key.to_string(),
            action: KeyAction::Press,
        })
    }

    /// Returns the edge to send, or `None` if the key was not held.
    pub fn release(&mut self, key: &str) -> Option<KeyEdge> {
        self.held.remove(key).then(|| KeyEdge {
            key: key.to_string(),
            action: KeyAction::Release,
        })
    }

    /// Releases every held key, e.g. when focus or the link is lost.
    pub fn release_all(&mut self) -> Vec<KeyEdge> {
        std::mem::take(&mut self.held)
            .into_iter()
            .map(|key| KeyEdge {
                key,
                action: KeyAction::Release,
            })
            .collect()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_filtered() {
        let mut input = InputTracker::new();
        assert!(input.press("w").is_some());
        assert!(input.press("w").is_none());
        assert!(input.is_held("w"));
        assert_eq!(
            input.release("w"),
            Some(KeyEdge {
                key: "w".into(),
                action: KeyAction::Release
            })
        );
        assert!(input.release("w").is_none());
    }

    #[test]
    fn release_all_drains_in_key_order() {
        let mut input = InputTracker::new();
        input.press("d");
        input.press("a");
        let keys: Vec<String> = input.release_all().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a".to_string(), "d".to_string()]);
        assert!(!input.is_held("a"));
    }
}
