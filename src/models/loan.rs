//! Loan model, lifecycle states and related types

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use super::member::MemberShort;
use crate::error::{AppError, AppResult};

/// Loan lifecycle state.
///
/// `Borrowed` is the initial state and `Returned` is terminal. `Overdue` is
/// observed on read for an unreturned loan past its due date; it holds a copy
/// exactly like `Borrowed` and may be returned the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }

    /// Whether a loan in this state keeps one copy of its book off the shelf
    pub fn holds_copy(&self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }

    /// The only transition checked at the data layer: `borrowed|overdue -> returned`
    pub fn ensure_returnable(&self, loan_id: i32) -> AppResult<()> {
        match self {
            LoanStatus::Returned => Err(AppError::AlreadyReturned(format!(
                "Loan {} has already been returned",
                loan_id
            ))),
            LoanStatus::Borrowed | LoanStatus::Overdue => Ok(()),
        }
    }

    /// Status as seen on `today`
    pub fn observed(
        &self,
        due_date: NaiveDate,
        return_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> LoanStatus {
        match self {
            LoanStatus::Returned => LoanStatus::Returned,
            _ if return_date.is_none() && due_date < today => LoanStatus::Overdue,
            other => *other,
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// Loan row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub member_id: i32,
    pub book_id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
    #[schema(value_type = String)]
    pub fine: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Loan {
    /// Same loan with its status replaced by the one observed on `today`
    pub fn observed(mut self, today: NaiveDate) -> Self {
        self.status = self.status.observed(self.due_date, self.return_date, today);
        self
    }

    pub fn holds_copy(&self) -> bool {
        self.status.holds_copy()
    }
}

/// Short book representation embedded in loan views
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub author: String,
}

/// Loan joined with its member and book, for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
    #[schema(value_type = String)]
    pub fine: Decimal,
    pub is_overdue: bool,
    pub member: MemberShort,
    pub book: BookShort,
    pub created_at: DateTime<Utc>,
}

/// Internal row structure for loan join queries
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetailsRow {
    pub id: i32,
    pub member_id: i32,
    pub book_id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
    pub fine: Decimal,
    pub created_at: DateTime<Utc>,
    pub member_name: String,
    pub member_email: String,
    pub book_title: String,
    pub book_author: String,
}

impl LoanDetailsRow {
    pub fn into_details(self, today: NaiveDate) -> LoanDetails {
        let status = self.status.observed(self.due_date, self.return_date, today);
        LoanDetails {
            id: self.id,
            loan_date: self.loan_date,
            due_date: self.due_date,
            return_date: self.return_date,
            status,
            fine: self.fine,
            is_overdue: status == LoanStatus::Overdue,
            member: MemberShort {
                id: self.member_id,
                name: self.member_name,
                email: self.member_email,
            },
            book: BookShort {
                id: self.book_id,
                title: self.book_title,
                author: self.book_author,
            },
            created_at: self.created_at,
        }
    }
}

/// Checkout request. Missing dates default to today and today plus the
/// configured loan duration.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_checkout_dates"))]
pub struct CreateLoan {
    #[validate(range(min = 1, message = "Invalid member id"))]
    pub member_id: i32,
    #[validate(range(min = 1, message = "Invalid book id"))]
    pub book_id: i32,
    pub loan_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

impl CreateLoan {
    /// Loan and due dates with the defaults filled in
    pub fn resolved_dates(&self, today: NaiveDate, default_days: u32) -> AppResult<(NaiveDate, NaiveDate)> {
        let loan_date = self.loan_date.unwrap_or(today);
        let due_date = match self.due_date {
            Some(due_date) => due_date,
            None => loan_date
                .checked_add_days(Days::new(u64::from(default_days)))
                .ok_or_else(|| {
                    AppError::Validation("Loan date too far in the future for a default due date".to_string())
                })?,
        };
        Ok((loan_date, due_date))
    }
}

fn validate_checkout_dates(req: &CreateLoan) -> Result<(), ValidationError> {
    if let (Some(loan_date), Some(due_date)) = (req.loan_date, req.due_date) {
        if due_date < loan_date {
            return Err(ValidationError::new("due_date_before_loan_date")
                .with_message("Due date cannot precede loan date".into()));
        }
    }
    Ok(())
}

/// Administrative loan correction. Replaces every editable field of the loan;
/// stock accounting follows whatever the edit implies.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_update_loan"))]
pub struct UpdateLoan {
    #[validate(range(min = 1, message = "Invalid member id"))]
    pub member_id: i32,
    #[validate(range(min = 1, message = "Invalid book id"))]
    pub book_id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub fine: Option<Decimal>,
}

impl UpdateLoan {
    pub fn fine_or_zero(&self) -> Decimal {
        self.fine.unwrap_or(Decimal::ZERO)
    }
}

fn validate_update_loan(req: &UpdateLoan) -> Result<(), ValidationError> {
    if req.due_date < req.loan_date {
        return Err(ValidationError::new("due_date_before_loan_date")
            .with_message("Due date cannot precede loan date".into()));
    }
    if req.fine_or_zero() < Decimal::ZERO {
        return Err(ValidationError::new("negative_fine")
            .with_message("Fine cannot be negative".into()));
    }
    if req.status.holds_copy() && req.return_date.is_some() {
        return Err(ValidationError::new("return_date_on_open_loan")
            .with_message("Only a returned loan can carry a return date".into()));
    }
    Ok(())
}

/// Loan list filter
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    /// Observed status (`overdue` matches unreturned loans past due)
    pub status: Option<LoanStatus>,
    pub member_id: Option<i32>,
    pub book_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
