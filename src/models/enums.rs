//! Shared domain enums
//!
//! Every status is stored as uppercase text and serialized the same way on
//! the wire, so the database, the JSON API and the Rust code share a single
//! closed vocabulary.

use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};
use utoipa::ToSchema;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
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
                match s.to_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl sqlx::Type<Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s: &str = Decode::<Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl Encode<'_, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

text_enum! {
    /// User role, drives every authorization check
    Role {
        Student => "STUDENT",
        Teacher => "TEACHER",
        Librarian => "LIBRARIAN",
        Admin => "ADMIN",
    }
}

impl Role {
    /// Librarians and admins run circulation
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }

    /// Roles a visitor may pick for themselves at registration
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, Role::Student | Role::Teacher)
    }
}

text_enum! {
    /// Kind of library item
    ItemType {
        Book => "BOOK",
        Dvd => "DVD",
        Magazine => "MAGAZINE",
        Equipment => "EQUIPMENT",
    }
}

text_enum! {
    /// Shelf status of a library item
    ItemStatus {
        Available => "AVAILABLE",
        Borrowed => "BORROWED",
        Maintenance => "MAINTENANCE",
        Lost => "LOST",
    }
}

text_enum! {
    LoanStatus {
        Borrowed => "BORROWED",
        Returned => "RETURNED",
    }
}

text_enum! {
    ReservationStatus {
        Pending => "PENDING",
        Fulfilled => "FULFILLED",
        Expired => "EXPIRED",
        Cancelled => "CANCELLED",
    }
}

impl ReservationStatus {
    /// Only pending reservations move; every other state is final
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (
                ReservationStatus::Pending,
                ReservationStatus::Fulfilled | ReservationStatus::Expired | ReservationStatus::Cancelled
            )
        )
    }
}

text_enum! {
    FineStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Waived => "WAIVED",
    }
}

impl FineStatus {
    /// PAID and WAIVED are terminal
    pub fn can_transition_to(&self, next: FineStatus) -> bool {
        matches!(
            (self, next),
            (FineStatus::Pending, FineStatus::Paid | FineStatus::Waived)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, FineStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("librarian".parse::<Role>(), Ok(Role::Librarian));
        assert_eq!("DVD".parse::<ItemType>(), Ok(ItemType::Dvd));
        assert!("JANITOR".parse::<Role>().is_err());
    }

    #[test]
    fn test_serde_uses_uppercase() {
        assert_eq!(serde_json::to_string(&FineStatus::Waived).unwrap(), "\"WAIVED\"");
        let status: ReservationStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(status, ReservationStatus::Cancelled);
    }

    #[test]
    fn test_fine_terminal_states_never_reopen() {
        for terminal in [FineStatus::Paid, FineStatus::Waived] {
            assert!(terminal.is_terminal());
            for next in [FineStatus::Pending, FineStatus::Paid, FineStatus::Waived] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(FineStatus::Pending.can_transition_to(FineStatus::Paid));
        assert!(FineStatus::Pending.can_transition_to(FineStatus::Waived));
        assert!(!FineStatus::Pending.can_transition_to(FineStatus::Pending));
    }

    #[test]
    fn test_reservation_transitions() {
        assert!(ReservationStatus::Pending.can_transition_to(ReservationStatus::Fulfilled));
        assert!(ReservationStatus::Pending.can_transition_to(ReservationStatus::Expired));
        assert!(!ReservationStatus::Fulfilled.can_transition_to(ReservationStatus::Cancelled));
        assert!(!ReservationStatus::Expired.can_transition_to(ReservationStatus::Fulfilled));
        assert!(!ReservationStatus::Cancelled.can_transition_to(ReservationStatus::Pending));
    }

    #[test]
    fn test_role_groups() {
        assert!(Role::Admin.is_staff());
        assert!(!Role::Teacher.is_staff());
        assert!(Role::Teacher.is_self_assignable());
        assert!(!Role::Librarian.is_self_assignable());
    }
}
