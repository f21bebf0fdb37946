//! Staff roles and the capabilities they grant

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::repayment::RepaymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    LoanOfficer,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::LoanOfficer => "loan_officer",
            Role::Viewer => "viewer",
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Admin => true,
            Role::Manager => matches!(
                capability,
                RecordRepayment | ApproveRepayment | VoidRepayment | ViewRepayments
            ),
            Role::LoanOfficer => matches!(capability, RecordRepayment | ViewRepayments),
            Role::Viewer => matches!(capability, ViewRepayments),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "loan_officer" => Ok(Role::LoanOfficer),
            "viewer" => Ok(Role::Viewer),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    RecordRepayment,
    ApproveRepayment,
    VoidRepayment,
    ViewRepayments,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::RecordRepayment => "repayments:record",
            Capability::ApproveRepayment => "repayments:approve",
            Capability::VoidRepayment => "repayments:void",
            Capability::ViewRepayments => "repayments:view",
        };
        f.write_str(name)
    }
}

/// The caller of a repayment operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Payment gateways act with record rights only
    pub fn gateway(provider: &str) -> Self {
        Self::new(format!("gateway:{}", provider), Role::LoanOfficer)
    }

    pub fn require(&self, capability: Capability) -> Result<(), RepaymentError> {
        if self.role.grants(capability) {
            Ok(())
        } else {
            tracing::warn!(
                actor = %self.id,
                role = self.role.as_str(),
                capability = %capability,
                "Capability check failed"
            );
            Err(RepaymentError::Authorization(format!(
                "role '{}' lacks {}",
                self.role.as_str(),
                capability
            )))
        }
    }
}
