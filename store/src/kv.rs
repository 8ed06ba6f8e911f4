//! Ordered byte-key store contract.

use crate::StoreError;

/// A key/value pair returned by a scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Ordered key-value storage supplied by the caller.
///
/// Keys compare lexicographically as bytes. Implementations use interior
/// mutability so one store handle can back several repositories.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// All pairs with `start <= key < end`, in key order. An empty `end` is unbounded.
    fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<KvPair>, StoreError>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        match prefix_upper_bound(prefix) {
            Some(end) => self.range(prefix, &end),
            None => Ok(self
                .range(prefix, &[])?
                .into_iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .collect()),
        }
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// The smallest key greater than every key starting with `prefix`, or `None`
/// when `prefix` is empty or all `0xff`.
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_bound_increments_last_byte() {
        assert_eq!(prefix_upper_bound(b"vr/"), Some(b"vr0".to_vec()));
        assert_eq!(prefix_upper_bound(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
        assert_eq!(prefix_upper_bound(&[]), None);
    }
}
