use serde::Serialize;

use crate::access::Tier;
use crate::error::{Error, Result};

/// A purchasable bundle of credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    pub id: &'static str,
    pub name: &'static str,
    pub price_rub: i64,
    pub credits: i64,
    /// Plan the buyer is moved up to, if any.
    pub plan: Option<Tier>,
}

pub const PACKAGES: &[CreditPackage] = &[
    CreditPackage { id: "start-pack", name: "Start", price_rub: 490, credits: 100, plan: None },
    CreditPackage {
        id: "creator",
        name: "Creator",
        price_rub: 990,
        credits: 250,
        plan: Some(Tier::Creator),
    },
    CreditPackage {
        id: "pro-studio",
        name: "Pro Studio",
        price_rub: 2490,
        credits: 700,
        plan: Some(Tier::ProStudio),
    },
    CreditPackage {
        id: "maximal",
        name: "Maximal",
        price_rub: 4990,
        credits: 1600,
        plan: Some(Tier::Maximal),
    },
];

pub fn find_package(id: &str) -> Option<&'static CreditPackage> {
    let id = id.trim().to_lowercase().replace('_', "-");
    PACKAGES.iter().find(|p| p.id == id)
}

pub fn require_package(id: &str) -> Result<&'static CreditPackage> {
    find_package(id).ok_or_else(|| Error::validation(format!("unknown package '{}'", id)))
}
