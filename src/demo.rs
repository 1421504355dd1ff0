//! Instrumented sample workload profiled by the CLI.
//!
//! A small batch job: generate records, parse them, score them with a
//! recursive function and checksum the result, optionally on several
//! worker threads. Every function enters a scope on the shared
//! [`ShadowStack`], so both collectors have something to observe.

use crate::call_site;
use crate::host::ShadowStack;
use log::debug;
use std::sync::Arc;
use std::thread;

/// Workload size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoConfig {
    /// Batches processed per worker
    pub iterations: usize,
    /// Records per batch
    pub batch_size: usize,
    /// Worker threads (1 runs on the calling thread)
    pub threads: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            batch_size: 200,
            threads: 1,
        }
    }
}

/// The workload bound to a host
pub struct DemoWorkload {
    host: Arc<ShadowStack>,
    config: DemoConfig,
}

impl DemoWorkload {
    pub fn new(host: Arc<ShadowStack>, config: DemoConfig) -> Self {
        Self { host, config }
    }

    /// Run every batch to completion and return the combined checksum
    pub fn run(&self) -> u64 {
        let host = &self.host;
        let _run = host.enter(call_site!("run"));

        if self.config.threads <= 1 {
            return self.worker(0);
        }

        thread::scope(|s| {
            let handles: Vec<_> = (0..self.config.threads)
                .map(|id| s.spawn(move || self.worker(id)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(0))
                .fold(0u64, u64::wrapping_add)
        })
    }

    fn worker(&self, id: usize) -> u64 {
        let _worker = self.host.enter(call_site!("worker"));
        let mut total = 0u64;
        for batch in 0..self.config.iterations {
            let records = self.generate(id, batch);
            let parsed = self.parse(&records);
            let scored = self.score(&parsed);
            total = total.wrapping_add(self.checksum(&scored));
        }
        debug!("Worker {} finished with checksum {}", id, total);
        total
    }

    fn generate(&self, id: usize, batch: usize) -> Vec<String> {
        let _scope = self.host.enter(call_site!("generate"));
        (0..self.config.batch_size)
            .map(|i| format!("{}:{}:{}", id, batch, (i * 7919) % 1000))
            .collect()
    }

    fn parse(&self, records: &[String]) -> Vec<u64> {
        let _scope = self.host.enter(call_site!("parse"));
        records
            .iter()
            .filter_map(|r| r.rsplit(':').next())
            .filter_map(|v| v.parse().ok())
            .collect()
    }

    fn score(&self, values: &[u64]) -> Vec<u64> {
        let _scope = self.host.enter(call_site!("score"));
        values.iter().map(|v| self.fib(10 + v % 8)).collect()
    }

    /// Recursive on purpose: shows one node per recursion level
    fn fib(&self, n: u64) -> u64 {
        let _scope = self.host.enter(call_site!("fib"));
        if n < 2 {
            return n;
        }
        // Only the top levels are instrumented to keep the tree small.
        if n > 12 {
            self.fib(n - 1).wrapping_add(self.fib(n - 2))
        } else {
            plain_fib(n)
        }
    }

    fn checksum(&self, values: &[u64]) -> u64 {
        let _scope = self.host.enter(call_site!("checksum"));
        values
            .iter()
            .fold(0xcbf2_9ce4_8422_2325u64, |hash, v| {
                (hash ^ v).wrapping_mul(0x0100_0000_01b3)
            })
    }
}

fn plain_fib(n: u64) -> u64 {
    if n < 2 {
        n
    } else {
        plain_fib(n - 1).wrapping_add(plain_fib(n - 2))
    }
}
