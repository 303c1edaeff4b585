//! Shared domain enums
//!
//! Every enum is stored as its canonical upper-case literal. Parsing is
//! case-insensitive so that legacy exports with mixed casing still load.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! literal_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $literal:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $literal)]
                $variant,
            )+
        }

        impl $name {
            /// All members in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $literal,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($literal) {
                        return Ok($name::$variant);
                    }
                )+
                Err(format!("Invalid {} value: {}", stringify!($name), s))
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Copies
// ---------------------------------------------------------------------------

literal_enum! {
    /// Availability of a physical or digital copy
    BookStatus {
        Available => "AVAILABLE",
        Checkout => "CHECKOUT",
        Lost => "LOST",
        Maintenance => "MAINTENANCE",
    }
}

literal_enum! {
    /// File format of a digital copy
    FileFormat {
        Epub => "EPUB",
        Pdf => "PDF",
        Mobi => "MOBI",
    }
}

literal_enum! {
    /// License attached to a digital copy
    LicenseType {
        OneUser => "ONEUSER",
        Unlimited => "UNLIMITED",
        Metered => "METERED",
    }
}

// ---------------------------------------------------------------------------
// Circulation
// ---------------------------------------------------------------------------

literal_enum! {
    LoanStatus {
        Checkout => "CHECKOUT",
        Returned => "RETURNED",
        Overdue => "OVERDUE",
        Expired => "EXPIRED",
    }
}

literal_enum! {
    ReservationStatus {
        Pending => "PENDING",
        Fulfilled => "FULFILLED",
        Cancelled => "CANCELLED",
        Expired => "EXPIRED",
    }
}
