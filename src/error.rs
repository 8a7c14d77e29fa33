//! Unified error type for the staking core.
//!
//! Two tiers of failure exist at the call sites: conditions the engine logs
//! and skips (a missing validator during a slash), and conditions that must
//! abort the enclosing transaction. Only the latter surface here as `Err`;
//! the host application discards the staged writes when it sees one.

use thiserror::Error;

use crate::Amount;

/// Errors produced by staking state transitions.
#[derive(Debug, Error)]
pub enum StakingError {
    /// Validator lookup missed, for an operation that cannot proceed without it.
    #[error("no validator found for {0}")]
    NoValidator(String),

    /// Delegation lookup missed.
    #[error("no delegation found for delegator {delegator} on validator {validator}")]
    NoDelegation {
        /// Hex-encoded delegator address.
        delegator: String,
        /// Hex-encoded validator owner address.
        validator: String,
    },

    /// Attempt to register a validator under an owner address already taken.
    #[error("validator already exists for owner {0}")]
    ValidatorExists(String),

    /// Operation not permitted on a jailed validator.
    #[error("validator {0} is jailed")]
    ValidatorJailed(String),

    /// Slash factor outside `[0, 1]`.
    #[error("slash factor {0} outside [0, 1]")]
    BadSlashFactor(String),

    /// Evidence names a block height that has not happened yet.
    #[error(
        "impossible attempt to slash infraction at height {infraction_height}, \
         current height {current_height}"
    )]
    FutureInfraction {
        /// Height named by the evidence.
        infraction_height: u64,
        /// Height of the block being executed.
        current_height: u64,
    },

    /// Removing more shares than a delegation or validator holds.
    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares {
        /// Shares requested for removal.
        requested: String,
        /// Shares actually held.
        held: String,
    },

    /// Redelegation with identical source and destination.
    #[error("redelegation source and destination validators match")]
    SelfRedelegation,

    /// Rational constructed with a zero denominator, or division by a zero rational.
    #[error("division by zero")]
    DivideByZero,

    /// Checked integer arithmetic failed.
    #[error("amount arithmetic overflow: {context} (value {value})")]
    Overflow {
        /// What was being computed.
        context: &'static str,
        /// The offending operand.
        value: Amount,
    },

    /// An accounting identity no longer holds; the transaction must abort.
    #[error("invariant broken: {0}")]
    InvariantBroken(String),

    /// Persistence layer failure.
    #[error("store error: {0}")]
    Store(String),
}

/// Result alias bound to [`StakingError`].
pub type Result<T, E = StakingError> = std::result::Result<T, E>;
