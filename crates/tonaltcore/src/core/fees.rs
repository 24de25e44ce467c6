//! Withdrawal fee computation.
//!
//! Two policies are supported. `Tiered` is the default: every started block of
//! `tier_size` costs `fee_per_tier`. `Flat` charges one fixed platform fee.
//! The fee is always capped at the gross amount, so the payout never goes
//! negative.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Fee policy selector as written in `FEE_POLICY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FeePolicyKind {
    Flat,
    Tiered,
}

/// How the platform fee is derived from a withdrawal's gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePolicy {
    /// One fixed fee per withdrawal.
    Flat { fee: i64 },
    /// `fee_per_tier * ceil(gross / tier_size)`.
    Tiered { tier_size: i64, fee_per_tier: i64 },
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy::Tiered {
            tier_size: 1000,
            fee_per_tier: 20,
        }
    }
}

/// Gross / fee / net split of a single withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
}

impl FeePolicy {
    /// Fee owed on `gross`, capped to `[0, gross]`.
    pub fn fee_for(&self, gross: i64) -> i64 {
        if gross <= 0 {
            return 0;
        }
        let raw = match *self {
            FeePolicy::Flat { fee } => fee,
            FeePolicy::Tiered {
                tier_size,
                fee_per_tier,
            } => {
                if tier_size <= 0 {
                    fee_per_tier
                } else {
                    let tiers = (gross + tier_size - 1) / tier_size;
                    fee_per_tier.saturating_mul(tiers)
                }
            }
        };
        raw.clamp(0, gross)
    }

    /// Splits `gross` into fee and net payout.
    pub fn breakdown(&self, gross: i64) -> FeeBreakdown {
        let gross = gross.max(0);
        let fee = self.fee_for(gross);
        FeeBreakdown {
            gross,
            fee,
            net: gross - fee,
        }
    }

    pub fn kind(&self) -> FeePolicyKind {
        match self {
            FeePolicy::Flat { .. } => FeePolicyKind::Flat,
            FeePolicy::Tiered { .. } => FeePolicyKind::Tiered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    const TIERED: FeePolicy = FeePolicy::Tiered {
        tier_size: 1000,
        fee_per_tier: 20,
    };

    #[test]
    fn test_tiered_fee_rounds_tiers_up() {
        assert_eq!(
            TIERED.breakdown(1450),
            FeeBreakdown {
                gross: 1450,
                fee: 40,
                net: 1410
            }
        );
        assert_eq!(TIERED.fee_for(1000), 20);
        assert_eq!(TIERED.fee_for(1001), 40);
        assert_eq!(TIERED.fee_for(200), 20);
    }

    #[test]
    fn test_flat_fee() {
        let flat = FeePolicy::Flat { fee: 20 };
        assert_eq!(flat.breakdown(250).net, 230);
        assert_eq!(flat.breakdown(5000).fee, 20);
    }

    #[test]
    fn test_fee_never_exceeds_gross() {
        let flat = FeePolicy::Flat { fee: 20 };
        assert_eq!(flat.breakdown(5).net, 0);
        assert_eq!(flat.breakdown(0), FeeBreakdown { gross: 0, fee: 0, net: 0 });
        assert_eq!(TIERED.breakdown(-10).net, 0);
    }

    #[test]
    fn test_fee_monotonic_and_net_bounded() {
        for policy in [TIERED, FeePolicy::Flat { fee: 20 }, FeePolicy::Tiered { tier_size: 7, fee_per_tier: 3 }] {
            let mut previous_fee = 0;
            for gross in 0..5000 {
                let b = policy.breakdown(gross);
                assert!(b.fee >= previous_fee, "fee must not decrease at gross={gross}");
                assert!(0 <= b.net && b.net <= gross, "net out of range at gross={gross}");
                assert_eq!(b.fee + b.net, gross);
                previous_fee = b.fee;
            }
        }
    }

    #[test]
    fn test_policy_kind_parsing() {
        assert_eq!(FeePolicyKind::from_str("tiered").unwrap(), FeePolicyKind::Tiered);
        assert_eq!(FeePolicyKind::from_str("FLAT").unwrap(), FeePolicyKind::Flat);
        assert!(FeePolicyKind::from_str("percent").is_err());
        assert_eq!(TIERED.kind().as_ref(), "tiered");
    }
}
