use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The set of coverage elements (e.g. program counters) observed for one execution.
///
/// Elements are kept sorted and deduplicated, so two signals built from the
/// same elements in any order compare equal and share a [`SignalSignature`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct Signal {
    elements: BTreeSet<u64>,
}

/// Canonical, comparable digest of a signal set, used to detect repeated paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalSignature([u8; 16]);

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, element: u64) -> bool {
        self.elements.insert(element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, element: u64) -> bool {
        self.elements.contains(&element)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.elements.iter().copied()
    }

    pub fn signature(&self) -> SignalSignature {
        let mut ctx = md5::Context::new();
        for element in &self.elements {
            ctx.consume(element.to_le_bytes());
        }
        SignalSignature(ctx.compute().0)
    }
}

impl FromIterator<u64> for Signal {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        Signal {
            elements: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<u64>> for Signal {
    fn from(raw: Vec<u64>) -> Self {
        raw.into_iter().collect()
    }
}

impl From<Signal> for Vec<u64> {
    fn from(signal: Signal) -> Self {
        signal.elements.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let signal = Signal::from(vec![3, 1, 3, 2, 1]);
        assert_eq!(signal.len(), 3);
        assert_eq!(signal.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn signature_ignores_order_but_not_content() {
        let a: Signal = [1u64, 2, 3].into_iter().collect();
        let b: Signal = [3u64, 1, 2].into_iter().collect();
        let c: Signal = [1u64, 2, 4].into_iter().collect();
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert_ne!(a.signature(), Signal::new().signature());
    }

    #[test]
    fn serializes_as_plain_array() {
        let signal = Signal::from(vec![7, 5]);
        let json = serde_json::to_string(&signal).unwrap();
        assert_eq!(json, "[5,7]");
        let back: Signal = serde_json::from_str("[7,5,5]").unwrap();
        assert_eq!(back, signal);
    }
}
