use std::cmp::Ordering;

/// One row of an iteration result. An empty value is either genuinely empty or was not fetched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> KeyValuePair {
        KeyValuePair {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key_only(key: impl Into<String>) -> KeyValuePair {
        KeyValuePair::new(key, String::new())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    Key,
    /// Ties are broken by key.
    Value,
}

impl SortOrder {
    pub fn compare(self, a: &KeyValuePair, b: &KeyValuePair) -> Ordering {
        match self {
            SortOrder::Key => a.key.cmp(&b.key),
            SortOrder::Value => a.value.cmp(&b.value).then_with(|| a.key.cmp(&b.key)),
        }
    }

    pub fn sort(self, pairs: &mut [KeyValuePair]) {
        // `sort_by` is stable, rows comparing equal keep their scan order.
        pairs.sort_by(|a, b| self.compare(a, b));
    }
}
