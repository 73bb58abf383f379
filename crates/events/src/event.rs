//! Market events

use lendkit_core::{AssetId, ItemId, PositionId, Principal, Role, TicketId};
use lendkit_liquidation::AbortReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something the market committed
///
/// Emitted only after every component touched by the operation is back in
/// a consistent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketEvent {
    PriceAccepted {
        asset: AssetId,
        value: u128,
        version: u64,
        /// Accepted through the governor reset path
        reset: bool,
    },
    Supplied {
        holder: Principal,
        amount: u128,
        shares: u128,
    },
    Redeemed {
        holder: Principal,
        shares: u128,
        amount: u128,
    },
    PositionOpened {
        position: PositionId,
        owner: Principal,
        item: ItemId,
    },
    CollateralDeposited {
        position: PositionId,
        item: ItemId,
    },
    CollateralWithdrawn {
        position: PositionId,
        item: ItemId,
        closed: bool,
    },
    Borrowed {
        position: PositionId,
        amount: u128,
        scaled: u128,
        price_version: u64,
    },
    Repaid {
        position: PositionId,
        paid: u128,
        refund: u128,
        scaled_burned: u128,
        closed: bool,
    },
    LiquidationOpened {
        ticket: TicketId,
        position: PositionId,
        debt: u128,
        collateral_value: u128,
        price_version: u64,
    },
    LiquidationCommitted {
        ticket: TicketId,
        position: PositionId,
        items: Vec<ItemId>,
        debt_repaid: u128,
    },
    LiquidationAborted {
        ticket: TicketId,
        position: PositionId,
        reason: AbortReason,
    },
    ItemReleased {
        item: ItemId,
    },
    RoleGranted {
        principal: Principal,
        role: Role,
    },
    /// A governor replaced a component's parameters
    ConfigChanged {
        component: String,
    },
}

impl MarketEvent {
    /// Short snake_case name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PriceAccepted { .. } => "price_accepted",
            Self::Supplied { .. } => "supplied",
            Self::Redeemed { .. } => "redeemed",
            Self::PositionOpened { .. } => "position_opened",
            Self::CollateralDeposited { .. } => "collateral_deposited",
            Self::CollateralWithdrawn { .. } => "collateral_withdrawn",
            Self::Borrowed { .. } => "borrowed",
            Self::Repaid { .. } => "repaid",
            Self::LiquidationOpened { .. } => "liquidation_opened",
            Self::LiquidationCommitted { .. } => "liquidation_committed",
            Self::LiquidationAborted { .. } => "liquidation_aborted",
            Self::ItemReleased { .. } => "item_released",
            Self::RoleGranted { .. } => "role_granted",
            Self::ConfigChanged { .. } => "config_changed",
        }
    }

    /// Position the event concerns, if any
    pub fn position(&self) -> Option<PositionId> {
        match self {
            Self::PositionOpened { position, .. }
            | Self::CollateralDeposited { position, .. }
            | Self::CollateralWithdrawn { position, .. }
            | Self::Borrowed { position, .. }
            | Self::Repaid { position, .. }
            | Self::LiquidationOpened { position, .. }
            | Self::LiquidationCommitted { position, .. }
            | Self::LiquidationAborted { position, .. } => Some(*position),
            _ => None,
        }
    }
}

impl fmt::Display for MarketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriceAccepted {
                asset,
                value,
                version,
                reset,
            } => {
                let how = if *reset { " (reset)" } else { "" };
                write!(f, "price {asset} = {value} at v{version}{how}")
            }
            Self::Supplied {
                holder,
                amount,
                shares,
            } => write!(f, "{holder} supplied {amount} for {shares} shares"),
            Self::Redeemed {
                holder,
                shares,
                amount,
            } => write!(f, "{holder} redeemed {shares} shares for {amount}"),
            Self::PositionOpened {
                position,
                owner,
                item,
            } => write!(f, "{owner} opened {position} with {item}"),
            Self::CollateralDeposited { position, item } => write!(f, "{item} added to {position}"),
            Self::CollateralWithdrawn {
                position,
                item,
                closed,
            } => {
                write!(f, "{item} withdrawn from {position}")?;
                if *closed {
                    write!(f, ", position closed")?;
                }
                Ok(())
            }
            Self::Borrowed {
                position,
                amount,
                price_version,
                ..
            } => write!(f, "{position} borrowed {amount} at v{price_version}"),
            Self::Repaid {
                position,
                paid,
                refund,
                closed,
                ..
            } => {
                write!(f, "{position} repaid {paid}")?;
                if *refund > 0 {
                    write!(f, " (refund {refund})")?;
                }
                if *closed {
                    write!(f, ", position closed")?;
                }
                Ok(())
            }
            Self::LiquidationOpened {
                ticket,
                position,
                debt,
                collateral_value,
                ..
            } => write!(
                f,
                "{ticket} opened on {position}: debt {debt}, collateral {collateral_value}"
            ),
            Self::LiquidationCommitted {
                ticket,
                position,
                items,
                debt_repaid,
            } => write!(
                f,
                "{ticket} committed on {position}: {} items seized, {debt_repaid} repaid",
                items.len()
            ),
            Self::LiquidationAborted {
                ticket,
                position,
                reason,
            } => write!(f, "{ticket} on {position} aborted: {reason}"),
            Self::ItemReleased { item } => write!(f, "{item} released from vault"),
            Self::RoleGranted { principal, role } => write!(f, "{principal} granted {role}"),
            Self::ConfigChanged { component } => write!(f, "{component} config changed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_externally_tagged_json() {
        let event = MarketEvent::Borrowed {
            position: PositionId(4),
            amount: 340_282_366_920_938_463_463_374_607_431_768_211_455,
            scaled: 7,
            price_version: 12,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with("{\"borrowed\":"));
        let back: MarketEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "borrowed");
        assert_eq!(back.position(), Some(PositionId(4)));
    }

    #[test]
    fn test_display() {
        let aborted = MarketEvent::LiquidationAborted {
            ticket: TicketId(2),
            position: PositionId(1),
            reason: AbortReason::SnapshotInvalidated,
        };
        assert_eq!(aborted.to_string(), "TKT-2 on POS-1 aborted: snapshot_invalidated");
        assert_eq!(aborted.position(), Some(PositionId(1)));

        let released = MarketEvent::ItemReleased {
            item: "PUNKS#3".parse().unwrap(),
        };
        assert!(released.to_string().contains("PUNKS#3"));
        assert_eq!(released.position(), None);
    }
}
