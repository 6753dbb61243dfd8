//! Data models for Biblioteca

pub mod author;
pub mod book;
pub mod enums;
pub mod inventory;
pub mod loan;
pub mod report;
pub mod reservation;
pub mod taxonomy;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::{Book, BookDetail, BookShort, BookView, NamedRef};
pub use enums::{CollectionStatus, InventoryCondition, InventoryStatus, LoanStatus, ReservationStatus, Role};
pub use inventory::{Availability, Inventory, InventoryView};
pub use loan::{Loan, LoanDetails};
pub use reservation::{Reservation, ReservationDetails};
pub use taxonomy::{TaxonomyKind, Term};
pub use user::{RequestContext, User, UserClaims, UserShort};
