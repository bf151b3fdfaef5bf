use crate::value::Value;

/// A managed list.
#[derive(Debug, Default)]
pub(crate) struct List {
    items: Vec<Value>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn take_children(&mut self, out: &mut Vec<Value>) {
        out.append(&mut self.items);
    }
}

/// A managed tuple, produced when native code returns several values at once.
#[derive(Debug, Default)]
pub(crate) struct Tuple {
    items: Vec<Value>,
}

impl Tuple {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn take_children(&mut self, out: &mut Vec<Value>) {
        out.append(&mut self.items);
    }
}
