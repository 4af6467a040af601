//! Domain model: money, transactions, wallets, refunds and the ports the
//! application layer drives them through.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod money;
pub mod ports;
pub mod refund;
pub mod transaction;
pub mod wallet;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Globally unique transaction identifier.
    TransactionId
);
define_id!(
    /// Globally unique wallet identifier.
    WalletId
);
define_id!(
    /// Globally unique ledger entry identifier.
    EntryId
);
define_id!(
    /// Globally unique refund identifier.
    RefundId
);
define_id!(
    /// Identifier of the customer owning wallets and transactions.
    CustomerId
);
