//! Access control - capabilities and role checks
//!
//! Caller identity is never inferred from ambient context. Every entry point
//! that performs an owner or role check takes a `Caller` explicitly; role
//! membership is answered by an `AccessControl` collaborator.

use crate::ids::Principal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Roles consumed by privileged entry points
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    /// May submit oracle prices
    Feeder,
    /// May change risk parameters, reset prices and release vault items
    Governor,
    /// May open, finalize and cancel liquidation tickets
    Liquidator,
    /// May supply liquidity, hold positions and borrow
    Participant,
}

/// Role check failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{principal} does not hold role {role}")]
pub struct AccessDenied {
    pub principal: Principal,
    pub role: Role,
}

/// The access-control collaborator interface
pub trait AccessControl: Send + Sync {
    fn has_role(&self, principal: &Principal, role: Role) -> bool;

    /// Fail with `AccessDenied` unless the caller holds `role`
    fn require(&self, caller: &Caller, role: Role) -> Result<(), AccessDenied> {
        if self.has_role(caller.principal(), role) {
            Ok(())
        } else {
            Err(AccessDenied {
                principal: caller.principal().clone(),
                role,
            })
        }
    }
}

/// Authenticated caller capability
///
/// Produced by the transport/authentication layer and passed by reference
/// into every call that needs to know who is acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    principal: Principal,
}

impl Caller {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// True if this caller acts as `principal`
    pub fn is(&self, principal: &Principal) -> bool {
        &self.principal == principal
    }
}

/// In-memory role table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleTable {
    grants: BTreeMap<Principal, BTreeSet<Role>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a role (idempotent)
    pub fn grant(&mut self, principal: Principal, role: Role) {
        self.grants.entry(principal).or_default().insert(role);
    }

    /// Builder-style grant
    pub fn with(mut self, principal: Principal, role: Role) -> Self {
        self.grant(principal, role);
        self
    }

    /// Revoke a role; returns true if it was held
    pub fn revoke(&mut self, principal: &Principal, role: Role) -> bool {
        let Some(roles) = self.grants.get_mut(principal) else {
            return false;
        };
        let removed = roles.remove(&role);
        if roles.is_empty() {
            self.grants.remove(principal);
        }
        removed
    }

    pub fn roles_of(&self, principal: &Principal) -> Vec<Role> {
        self.grants
            .get(principal)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl AccessControl for RoleTable {
    fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.grants
            .get(principal)
            .is_some_and(|roles| roles.contains(&role))
    }
}
