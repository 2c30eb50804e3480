//! Last-value tracking for change timestamps

use std::collections::HashMap;

use hmbridge_core::RpcValue;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct ValueRecord {
    value: RpcValue,
    changed_at: i64,
}

/// Remembers the last value per `address/datapoint`
#[derive(Default)]
pub struct ValueTracker {
    records: Mutex<HashMap<String, ValueRecord>>,
}

impl ValueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed value and return its last-changed timestamp
    ///
    /// A first observation counts as a change.
    pub fn record(&self, address: &str, datapoint: &str, value: &RpcValue, ts: i64) -> i64 {
        let key = format!("{}/{}", address, datapoint);
        let mut records = self.records.lock();
        match records.get_mut(&key) {
            Some(record) if record.value == *value => record.changed_at,
            Some(record) => {
                record.value = value.clone();
                record.changed_at = ts;
                ts
            }
            None => {
                records.insert(
                    key,
                    ValueRecord {
                        value: value.clone(),
                        changed_at: ts,
                    },
                );
                ts
            }
        }
    }

    pub fn last_value(&self, address: &str, datapoint: &str) -> Option<RpcValue> {
        self.records
            .lock()
            .get(&format!("{}/{}", address, datapoint))
            .map(|r| r.value.clone())
    }
}
