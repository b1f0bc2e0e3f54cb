//! Data models for Librarium

pub mod category;
pub mod enums;
pub mod fine;
pub mod item;
pub mod loan;
pub mod reservation;
pub mod user;

// Re-export commonly used types
pub use category::Category;
pub use enums::{FineStatus, ItemStatus, ItemType, LoanStatus, ReservationStatus, Role};
pub use fine::Fine;
pub use item::LibraryItem;
pub use loan::{Loan, LoanDetails};
pub use reservation::{Reservation, ReservationDetails};
pub use user::User;
