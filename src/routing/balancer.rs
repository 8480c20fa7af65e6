//! Server selection for a service.
//!
//! The selection policy is pluggable through [`ServerSelector`]; the
//! builder creates one selector per service per configuration generation
//! and shares it between every router targeting that service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::model::{LoadBalancerKind, ServerSpec};

pub trait ServerSelector: Send + Sync {
    fn select<'a>(&self, servers: &'a [ServerSpec]) -> Option<&'a ServerSpec>;
}

/// Always the first declared server.
#[derive(Debug, Default)]
pub struct FirstServer;

impl ServerSelector for FirstServer {
    fn select<'a>(&self, servers: &'a [ServerSpec]) -> Option<&'a ServerSpec> {
        servers.first()
    }
}

/// Rotates through servers with a shared counter.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl ServerSelector for RoundRobin {
    fn select<'a>(&self, servers: &'a [ServerSpec]) -> Option<&'a ServerSpec> {
        if servers.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % servers.len();
        servers.get(index)
    }
}

#[must_use]
pub fn selector_for(kind: LoadBalancerKind) -> Arc<dyn ServerSelector> {
    match kind {
        LoadBalancerKind::First => Arc::new(FirstServer),
        LoadBalancerKind::RoundRobin => Arc::new(RoundRobin::default()),
    }
}
