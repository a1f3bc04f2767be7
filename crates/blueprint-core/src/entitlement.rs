//! Usage/entitlement gate
//!
//! The pipeline reserves one unit before running and hands it back if the
//! event fails, so concurrent requests cannot overrun a limit.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Answer to "may this user log another event?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub allowed: bool,
    /// `None` means unlimited
    pub limit: Option<u32>,
}

impl Entitlement {
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            limit: None,
        }
    }
}

/// Entitlement collaborator
pub trait EntitlementGate: Send + Sync {
    fn can_log_event(&self, user: &UserId) -> Entitlement;

    /// Check and take one unit in a single step
    fn try_consume(&self, user: &UserId) -> Entitlement;

    /// Return a unit taken by `try_consume` for an event that did not commit
    fn release(&self, user: &UserId);
}

/// Allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl EntitlementGate for Unlimited {
    fn can_log_event(&self, _user: &UserId) -> Entitlement {
        Entitlement::unlimited()
    }

    fn try_consume(&self, _user: &UserId) -> Entitlement {
        Entitlement::unlimited()
    }

    fn release(&self, _user: &UserId) {}
}

/// Fixed per-user event quota, counted in memory
#[derive(Debug)]
pub struct QuotaEntitlements {
    limit: u32,
    used: DashMap<UserId, u32>,
}

impl QuotaEntitlements {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            used: DashMap::new(),
        }
    }

    pub fn used(&self, user: &UserId) -> u32 {
        self.used.get(user).map(|u| *u).unwrap_or(0)
    }

    pub fn reset(&self, user: &UserId) {
        self.used.remove(user);
    }
}

impl EntitlementGate for QuotaEntitlements {
    fn can_log_event(&self, user: &UserId) -> Entitlement {
        Entitlement {
            allowed: self.used(user) < self.limit,
            limit: Some(self.limit),
        }
    }

    fn try_consume(&self, user: &UserId) -> Entitlement {
        // the entry guard holds the shard lock across check and increment
        let mut used = self.used.entry(user.clone()).or_insert(0);
        let allowed = *used < self.limit;
        if allowed {
            *used += 1;
        }
        Entitlement {
            allowed,
            limit: Some(self.limit),
        }
    }

    fn release(&self, user: &UserId) {
        if let Some(mut used) = self.used.get_mut(user) {
            *used = used.saturating_sub(1);
        }
    }
}
