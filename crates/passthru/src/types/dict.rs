use indexmap::IndexMap;

use crate::value::Value;

pub(crate) type AttrMap = IndexMap<String, Value, ahash::RandomState>;

/// A string-keyed, insertion-ordered managed dict.
#[derive(Debug, Default)]
pub(crate) struct Dict {
    entries: AttrMap,
}

impl Dict {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut entries = AttrMap::default();
        entries.extend(pairs);
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Inserts `value` under `key`, returning the displaced value.
    ///
    /// The caller owns the returned value and must release it through the heap.
    pub fn set(&mut self, key: String, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }

    pub fn take_children(&mut self, out: &mut Vec<Value>) {
        out.extend(self.entries.drain(..).map(|(_, v)| v));
    }
}
