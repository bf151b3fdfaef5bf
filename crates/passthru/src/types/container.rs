use crate::value::Value;

/// Managed side of the handle container: owns one reference to the ferried value.
///
/// Equality and hashing are defined on the identity of `wrapped`, never on the
/// container itself, see `Runtime::eq` and `Runtime::hash`.
#[derive(Debug)]
pub(crate) struct Container {
    wrapped: Value,
}

impl Container {
    pub fn new(wrapped: Value) -> Self {
        Self { wrapped }
    }

    /// Borrow of the wrapped value; clone through the heap to keep it.
    pub fn wrapped(&self) -> &Value {
        &self.wrapped
    }

    pub fn take_children(&mut self, out: &mut Vec<Value>) {
        out.push(std::mem::replace(&mut self.wrapped, Value::None));
    }
}
