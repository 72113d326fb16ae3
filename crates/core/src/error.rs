//! Router error taxonomy.

use alloy::primitives::{Address, U256};
use router_venues::{VenueError, VenueId};

use crate::pool_store::PoolAdapterHandle;

/// Broad class of a [`RouterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No venue can serve the request. Expected; callers decline and move on.
    Selection,
    /// Caller is not the position owner, its pool adapter, or governance.
    Authorization,
    /// Operation on an unknown, unregistered or closed position.
    State,
    /// Result would break a health factor or debt bound.
    SafetyBound,
    /// Configuration or venue failure.
    Internal,
}

/// Errors returned by router operations.
///
/// Every mutating operation either commits fully or returns one of these
/// with no registry change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("no lending platform can serve {collateral} -> {borrow}")]
    NoPlatformFound { collateral: Address, borrow: Address },

    #[error("caller {caller} does not own pool adapter {handle}")]
    Unauthorized {
        caller: Address,
        handle: PoolAdapterHandle,
    },

    #[error("capability is not valid for pool adapter {0}")]
    InvalidCapability(PoolAdapterHandle),

    #[error("caller {0} is not governance")]
    NotGovernance(Address),

    #[error("pool adapter {0} has no registered position")]
    PositionNotRegistered(PoolAdapterHandle),

    #[error("unknown pool adapter {0}")]
    UnknownPoolAdapter(PoolAdapterHandle),

    #[error("pool adapter {handle} has no debt in asset {asset}")]
    AssetNotBorrowed {
        handle: PoolAdapterHandle,
        asset: Address,
    },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("wrong health factor: {actual} is below minimum {min} (WAD)")]
    WrongHealthFactor { actual: U256, min: U256 },

    #[error("repay amount {amount} exceeds outstanding debt {debt}")]
    RepayExceedsDebt { amount: U256, debt: U256 },

    #[error("active collateral {available} is smaller than released amount {released}")]
    AccumulatorUnderflow { available: U256, released: U256 },

    #[error("platform {0} is already registered")]
    DuplicatePlatform(VenueId),

    #[error("platform {0} is not registered")]
    UnknownPlatform(VenueId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("venue error: {0}")]
    Venue(#[from] VenueError),
}

impl RouterError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoPlatformFound { .. } => ErrorKind::Selection,
            Self::Unauthorized { .. } | Self::InvalidCapability(_) | Self::NotGovernance(_) => {
                ErrorKind::Authorization
            }
            Self::PositionNotRegistered(_)
            | Self::UnknownPoolAdapter(_)
            | Self::AssetNotBorrowed { .. }
            | Self::ZeroAmount => ErrorKind::State,
            Self::WrongHealthFactor { .. }
            | Self::RepayExceedsDebt { .. }
            | Self::AccumulatorUnderflow { .. } => ErrorKind::SafetyBound,
            Self::DuplicatePlatform(_)
            | Self::UnknownPlatform(_)
            | Self::InvalidConfig(_)
            | Self::Venue(_) => ErrorKind::Internal,
        }
    }

    /// True for the expected "no route" outcome of a selection.
    pub fn is_no_route(&self) -> bool {
        self.kind() == ErrorKind::Selection
    }
}

/// Result alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let no_route = RouterError::NoPlatformFound {
            collateral: Address::ZERO,
            borrow: Address::ZERO,
        };
        assert!(no_route.is_no_route());
        assert_eq!(no_route.kind(), ErrorKind::Selection);

        let handle = PoolAdapterHandle::from_raw(7);
        assert_eq!(
            RouterError::Unauthorized { caller: Address::ZERO, handle }.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(RouterError::PositionNotRegistered(handle).kind(), ErrorKind::State);
        assert_eq!(
            RouterError::WrongHealthFactor { actual: U256::ZERO, min: U256::ZERO }.kind(),
            ErrorKind::SafetyBound
        );
        assert!(!RouterError::Venue(VenueError::ZeroAmount).is_no_route());
    }

    #[test]
    fn test_error_display() {
        let err = RouterError::PositionNotRegistered(PoolAdapterHandle::from_raw(3));
        assert_eq!(err.to_string(), "pool adapter pa#3 has no registered position");
    }
}
