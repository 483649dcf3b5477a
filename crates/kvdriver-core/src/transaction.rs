//! Transaction bridge.
//!
//! [`KeyValueStore::update`](crate::KeyValueStore::update) hands the caller's
//! function a [`Bucket`] bound to whatever write primitive the active engine
//! provides. How much the writes made through it are worth depends on the
//! engine and is reported by [`TxGuarantee`].

use crate::Result;

/// Write capability granted for the duration of one `update` call.
pub trait Bucket {
    /// Insert or update a key-value pair
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key-value pair
    fn delete(&mut self, key: &[u8]) -> Result<()>;
}

/// Function run inside `update`.
///
/// Returning an error rolls back every write made through the bucket on
/// engines with [`TxGuarantee::Atomic`]; it has no effect on prior writes
/// elsewhere.
pub type Execute<'a> = dyn FnMut(&mut dyn Bucket) -> Result<()> + 'a;

/// What a store promises about the writes made inside one `update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxGuarantee {
    /// All writes commit together or none become visible
    Atomic,
    /// Each write is applied immediately and independently; nothing is
    /// rolled back when the function fails
    BestEffortSequential,
}

impl TxGuarantee {
    /// Returns `true` when a failed function leaves the store untouched.
    pub fn is_atomic(self) -> bool {
        matches!(self, TxGuarantee::Atomic)
    }
}

/// [`Bucket`] built from a pair of closures.
///
/// Used by adapters whose native transaction handle does not fit the trait
/// directly.
pub struct FnBucket<P, D>
where
    P: FnMut(&[u8], &[u8]) -> Result<()>,
    D: FnMut(&[u8]) -> Result<()>,
{
    put: P,
    delete: D,
}

impl<P, D> FnBucket<P, D>
where
    P: FnMut(&[u8], &[u8]) -> Result<()>,
    D: FnMut(&[u8]) -> Result<()>,
{
    /// Create a bucket forwarding to `put` and `delete`
    pub fn new(put: P, delete: D) -> Self {
        Self { put, delete }
    }
}

impl<P, D> Bucket for FnBucket<P, D>
where
    P: FnMut(&[u8], &[u8]) -> Result<()>,
    D: FnMut(&[u8]) -> Result<()>,
{
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        (self.put)(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        (self.delete)(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_fn_bucket_forwards() {
        let mut log: Vec<String> = Vec::new();
        {
            let log = std::cell::RefCell::new(&mut log);
            let mut bucket = FnBucket::new(
                |k: &[u8], v: &[u8]| {
                    log.borrow_mut().push(format!(
                        "put {} {}",
                        String::from_utf8_lossy(k),
                        String::from_utf8_lossy(v)
                    ));
                    Ok(())
                },
                |k: &[u8]| {
                    log.borrow_mut().push(format!("del {}", String::from_utf8_lossy(k)));
                    Ok(())
                },
            );
            let execute: &mut Execute<'_> = &mut |b: &mut dyn Bucket| {
                b.put(b"a", b"1")?;
                b.delete(b"a")
            };
            execute(&mut bucket).unwrap();
        }
        assert_eq!(log, vec!["put a 1".to_string(), "del a".to_string()]);
    }

    #[test]
    fn test_fn_bucket_propagates_errors() {
        let mut bucket = FnBucket::new(
            |_: &[u8], _: &[u8]| Err(Error::AdmissionRejected),
            |_: &[u8]| Ok(()),
        );
        assert!(matches!(bucket.put(b"k", b"v"), Err(Error::AdmissionRejected)));
        assert!(bucket.delete(b"k").is_ok());
    }

    #[test]
    fn test_guarantee() {
        assert!(TxGuarantee::Atomic.is_atomic());
        assert!(!TxGuarantee::BestEffortSequential.is_atomic());
    }
}
