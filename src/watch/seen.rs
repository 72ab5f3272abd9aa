use std::collections::HashSet;
use std::sync::Arc;

use alloy_primitives::Address;
use parking_lot::Mutex;

/// Addresses currently being evaluated, or already reported
///
/// Membership is taken through [`SeenSet::claim`], a single test-and-set under the lock. The
/// returned [`Claim`] releases the address when dropped, unless it was confirmed
#[derive(Debug, Default)]
pub struct SeenSet {
    inner: Mutex<HashSet<Address>>,
}

/// Provisional membership of one address in a [`SeenSet`]
#[derive(Debug)]
#[must_use = "dropping a claim releases the address"]
pub struct Claim {
    set: Arc<SeenSet>,
    address: Address,
    confirmed: bool,
}

impl SeenSet {
    pub fn new() -> Arc<Self> {
        Default::default()
    }

    /// Marks `address` as taken. `None` if someone else already holds or reported it
    pub fn claim(self: &Arc<Self>, address: Address) -> Option<Claim> {
        if !self.inner.lock().insert(address) {
            return None;
        }

        Some(Claim {
            set: self.clone(),
            address,
            confirmed: false,
        })
    }

    #[cfg(test)]
    pub fn contains(&self, address: &Address) -> bool {
        self.inner.lock().contains(address)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Claim {
    /// Keeps the address in the set for good
    pub fn confirm(mut self) {
        self.confirmed = true;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.confirmed {
            self.set.inner.lock().remove(&self.address);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn address() -> Address {
        Address::repeat_byte(0x42)
    }

    #[rstest]
    fn test_claim_is_exclusive(address: Address) {
        let seen = SeenSet::new();

        let claim = seen.claim(address);

        assert!(claim.is_some());
        assert!(seen.claim(address).is_none());
        assert!(seen.contains(&address));
    }

    #[rstest]
    fn test_drop_releases(address: Address) {
        let seen = SeenSet::new();

        drop(seen.claim(address));

        assert!(!seen.contains(&address));
        assert!(seen.claim(address).is_some());
    }

    #[rstest]
    fn test_confirm_keeps(address: Address) {
        let seen = SeenSet::new();

        seen.claim(address).unwrap().confirm();

        assert!(seen.contains(&address));
        assert!(seen.claim(address).is_none());
        assert_eq!(seen.len(), 1);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims(address: Address) {
        let seen = SeenSet::new();
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let seen = seen.clone();
                let winners = winners.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    if let Some(claim) = seen.claim(address) {
                        winners.fetch_add(1, Ordering::SeqCst);
                        claim.confirm();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_aborted_task_releases(address: Address) {
        let seen = SeenSet::new();

        let task = {
            let seen = seen.clone();
            tokio::spawn(async move {
                let _claim = seen.claim(address);
                std::future::pending::<()>().await;
            })
        };
        tokio::task::yield_now().await;
        while !seen.contains(&address) {
            tokio::task::yield_now().await;
        }

        task.abort();
        let _ = task.await;

        assert!(seen.is_empty());
    }
}
