use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::buffer::BatchSink;

/// Records every batch it is handed.
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingSink {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl BatchSink for RecordingSink {
    fn flush(&self, batch: Vec<String>) -> impl Future<Output = ()> + Send + '_ {
        async move {
            self.batches.lock().unwrap().push(batch);
        }
    }
}

/// Takes 100ms per delivery and tracks how many deliveries overlapped.
#[derive(Clone, Default)]
pub struct SlowSink {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl SlowSink {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl BatchSink for SlowSink {
    fn flush(&self, batch: Vec<String>) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(batch);
        }
    }
}

/// Owned copies of string literals, for batch assertions.
pub fn batch(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// HTTP tests build reqwest clients, which need a process-wide rustls provider.
pub fn install_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
