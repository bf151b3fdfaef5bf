use crate::{types::dict::AttrMap, value::Value};

/// An instance of a user class: a class name plus an ordered attribute map.
///
/// Native code never sees attributes directly; composite records read a fixed
/// set of them by name at entry-marshal time.
#[derive(Debug)]
pub(crate) struct Instance {
    class_name: String,
    attrs: AttrMap,
}

impl Instance {
    pub fn new(class_name: String, attrs: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut map = AttrMap::default();
        map.extend(attrs);
        Self {
            class_name,
            attrs: map,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Sets an attribute, returning the displaced value for the caller to release.
    pub fn set_attr(&mut self, name: String, value: Value) -> Option<Value> {
        self.attrs.insert(name, value)
    }

    pub fn take_children(&mut self, out: &mut Vec<Value>) {
        out.extend(self.attrs.drain(..).map(|(_, v)| v));
    }
}
