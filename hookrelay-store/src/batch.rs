/// One mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, value: String },
    Delete { key: String },
    /// Remove every key starting with the prefix
    DeletePrefix { prefix: String },
}

/// Ordered list of mutations applied atomically by a store.
///
/// Operations run in insertion order, so a `DeletePrefix` followed by puts
/// under the same prefix leaves exactly the new keys behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_put(key, value);
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    pub fn delete_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ops.push(BatchOp::DeletePrefix {
            prefix: prefix.into(),
        });
        self
    }

    /// In-place variant of [`WriteBatch::put`] for loops
    pub fn push_put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
