// ── Row identity types ──
//
// Every persisted entity is addressed by a store-assigned `i64`. Each
// table gets its own newtype so a subnet id can never be passed where a
// daemon id is expected. Zero means "not yet persisted".

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Placeholder carried by entities the store has not seen yet.
            pub const UNASSIGNED: Self = Self(0);

            pub fn get(self) -> i64 {
                self.0
            }

            pub fn is_assigned(self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

row_id!(
    /// Identity of an enrolled machine running a control agent.
    MachineId
);
row_id!(
    /// Stable daemon identity; LocalX rows reference daemons only by this id.
    DaemonId
);
row_id!(SubnetId);
row_id!(SharedNetworkId);
row_id!(HostId);
row_id!(ServiceId);
row_id!(ScheduledChangeId);
row_id!(EventId);
row_id!(
    /// Operator on whose behalf a transaction runs.
    UserId
);
