//! Security registry used while building records.
//!
//! The batch driver is the only writer. Lookups and inserts happen in the
//! sequential build pass, never from the parallel extraction.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::pp::Security;

/// Read/insert access to the security master data
pub trait SecurityRegistry: Send + Sync {
    /// Find a security by ISIN or WKN
    fn lookup_by_identifier(&self, identifier: &str) -> Option<Security>;

    /// Insert a security. If one with the same ISIN or WKN exists, nothing is
    /// inserted and the existing one is returned.
    fn insert(&self, security: Security) -> Security;
}

/// Registry kept in memory, e.g. as a per-batch scratch registry
#[derive(Debug, Default)]
pub struct InMemorySecurityRegistry {
    securities: Mutex<Vec<Security>>,
}

impl InMemorySecurityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_securities(securities: Vec<Security>) -> Self {
        Self {
            securities: Mutex::new(securities),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Security>> {
        self.securities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of all securities
    pub fn securities(&self) -> Vec<Security> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl SecurityRegistry for InMemorySecurityRegistry {
    fn lookup_by_identifier(&self, identifier: &str) -> Option<Security> {
        self.lock()
            .iter()
            .find(|s| s.has_identifier(identifier))
            .cloned()
    }

    fn insert(&self, security: Security) -> Security {
        let mut securities = self.lock();
        let existing = securities.iter().find(|s| {
            security.isin.as_deref().is_some_and(|isin| s.has_identifier(isin))
                || security.wkn.as_deref().is_some_and(|wkn| s.has_identifier(wkn))
        });
        if let Some(existing) = existing {
            return existing.clone();
        }
        log::debug!("Registering security {} ({:?})", security.name, security.identifier());
        securities.push(security.clone());
        security
    }
}
