//! Data models for Shelfmark

pub mod book;
pub mod category;
pub mod loan;
pub mod member;
pub mod principal;

// Re-export commonly used types
pub use book::{Book, BookDetails, StockReport};
pub use category::Category;
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use member::{Member, MemberStatus};
pub use principal::Principal;
