//! Plan quotas: how many properties a tier may track and how often it may
//! receive reports.
//!
//! The same limits are applied twice. When settings are saved they are a hard
//! guard (see [`crate::configuration`]); during a cycle they only decide which
//! of a tenant's due reports run now (see [`select_within_allowance`]).

use crate::domain::{settings::DueReport, tenant::SubscriptionTier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub max_properties: usize,
    pub min_frequency_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub free: TierLimits,
    pub pro: TierLimits,
    pub max: TierLimits,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free: TierLimits {
                max_properties: 1,
                min_frequency_days: 30,
            },
            pro: TierLimits {
                max_properties: 3,
                min_frequency_days: 7,
            },
            max: TierLimits {
                max_properties: 5,
                min_frequency_days: 7,
            },
        }
    }
}

impl QuotaPolicy {
    pub fn limits(&self, tier: SubscriptionTier) -> TierLimits {
        match tier {
            SubscriptionTier::Free => self.free,
            SubscriptionTier::Pro => self.pro,
            SubscriptionTier::Max => self.max,
        }
    }

    /// Limits for a raw stored tier string; unknown or missing is `free`.
    pub fn limits_for(&self, raw_tier: Option<&str>) -> TierLimits {
        self.limits(SubscriptionTier::parse(raw_tier))
    }
}

/// Splits one tenant's due reports into (run now, skip this cycle).
///
/// Oldest properties win, so a tenant who downgraded keeps their
/// longest-standing reports. Property id breaks creation-time ties so the
/// choice is stable across cycles.
pub fn select_within_allowance(
    mut due: Vec<DueReport>,
    max_properties: usize,
) -> (Vec<DueReport>, Vec<DueReport>) {
    due.sort_by(|a, b| {
        a.property_created_at
            .cmp(&b.property_created_at)
            .then_with(|| a.property_id.cmp(&b.property_id))
    });
    let skipped = if due.len() > max_properties {
        due.split_off(max_properties)
    } else {
        Vec::new()
    };
    (due, skipped)
}
