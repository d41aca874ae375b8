use std::collections::HashSet;

/// State for one asynchronously loaded resource.
///
/// Every fetch-shaped operation goes `begin -> fulfil | reject`. Loading is
/// tracked per operation kind, so one settling never hides another still in
/// flight. A recorded error is cleared only when an operation of the same
/// kind begins again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsyncSlice<T> {
    pub data: T,
    loading: HashSet<&'static str>,
    error: Option<SliceError>,
}

#[derive(Debug, Clone, PartialEq)]
struct SliceError {
    op: &'static str,
    message: String,
}

impl<T> AsyncSlice<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            loading: HashSet::new(),
            error: None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Whether any operation is in flight.
    pub fn is_loading(&self) -> bool {
        !self.loading.is_empty()
    }

    pub fn is_loading_op(&self, op: &str) -> bool {
        self.loading.contains(op)
    }

    pub fn begin(&mut self, op: &'static str) {
        self.loading.insert(op);
        if self.error.as_ref().is_some_and(|e| e.op == op) {
            self.error = None;
        }
    }

    pub fn fulfil<P>(&mut self, op: &'static str, payload: P, merge: impl FnOnce(&mut T, P)) {
        self.loading.remove(op);
        merge(&mut self.data, payload);
    }

    pub fn reject(&mut self, op: &'static str, message: impl Into<String>) {
        self.loading.remove(op);
        self.error = Some(SliceError {
            op,
            message: message.into(),
        });
    }

    /// Settle without applying anything, e.g. for a discarded stale result.
    pub fn settle(&mut self, op: &'static str) {
        self.loading.remove(op);
    }
}
