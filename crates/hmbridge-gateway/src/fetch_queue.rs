//! Per-interface paramset description fetch queue

use std::collections::VecDeque;

use hmbridge_core::ParamsetTypeKey;
use parking_lot::Mutex;

/// One `getParamsetDescription(address, kind)` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub address: String,
    pub kind: String,
    pub type_key: ParamsetTypeKey,
}

#[derive(Default)]
struct Inner {
    jobs: VecDeque<FetchJob>,
    draining: bool,
}

/// FIFO of fetch jobs with a single drainer
///
/// Jobs enqueued while a drain is running are picked up by that drain.
#[derive(Default)]
pub struct FetchQueue {
    inner: Mutex<Inner>,
}

impl FetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append jobs; returns `true` when the caller must start a drain
    pub fn enqueue(&self, jobs: Vec<FetchJob>) -> bool {
        let mut inner = self.inner.lock();
        inner.jobs.extend(jobs);
        if inner.draining {
            false
        } else {
            inner.draining = true;
            true
        }
    }

    /// Next job for the drainer; `None` ends the drain
    pub fn next(&self) -> Option<FetchJob> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.pop_front();
        if job.is_none() {
            inner.draining = false;
        }
        job
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(address: &str) -> FetchJob {
        FetchJob {
            address: address.to_string(),
            kind: "VALUES".to_string(),
            type_key: ParamsetTypeKey::new("HM-LC-Bl1-FM", 1, "BLIND"),
        }
    }

    #[test]
    fn test_single_drainer() {
        let queue = FetchQueue::new();
        assert!(queue.enqueue(vec![job("A:1")]));
        assert!(!queue.enqueue(vec![job("B:1")]));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.next().unwrap().address, "A:1");
        assert_eq!(queue.next().unwrap().address, "B:1");
        assert!(queue.is_draining());
        assert_eq!(queue.next(), None);
        assert!(!queue.is_draining());

        // An empty rebuild still hands out a drain so the cache gets persisted
        assert!(queue.enqueue(Vec::new()));
    }
}
