//! Coordinator tests against a real database.
//! Run with: DATABASE_URL=... cargo test -- --ignored

use chrono::Duration;
use tokio::task::JoinSet;

use shelfmark::{
    error::AppError,
    models::{
        book::UpdateBook,
        loan::{LoanQuery, LoanStatus, UpdateLoan},
    },
    services::{today, Services},
};

use crate::common::{db_services, seed_book, seed_member};

async fn checkout_now(services: &Services, member_id: i32, book_id: i32) -> Result<i32, AppError> {
    let start = today();
    services
        .inventory
        .checkout(member_id, book_id, start, start + Duration::days(14))
        .await
        .map(|loan| loan.id)
}

async fn available(services: &Services, book_id: i32) -> i32 {
    services.get_book(book_id).await.unwrap().available_copies
}

async fn assert_consistent(services: &Services, book_id: i32) {
    let report = services.inventory.audit_stock(book_id).await.unwrap();
    assert!(report.consistent, "stock drifted: {:?}", report);
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_single_copy_scenario() {
    let services = db_services().await;
    let book = seed_book(&services, 1).await;
    let alice = seed_member(&services).await;
    let bob = seed_member(&services).await;

    let loan_id = checkout_now(&services, alice.id, book.id).await.unwrap();
    assert_eq!(available(&services, book.id).await, 0);

    let second = checkout_now(&services, bob.id, book.id).await;
    assert!(matches!(second, Err(AppError::OutOfStock(_))));
    assert_eq!(available(&services, book.id).await, 0);

    let returned = services.inventory.return_book(loan_id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.return_date, Some(today()));
    assert_eq!(available(&services, book.id).await, 1);

    let again = services.inventory.return_book(loan_id).await;
    assert!(matches!(again, Err(AppError::AlreadyReturned(_))));
    assert_eq!(available(&services, book.id).await, 1);

    assert_consistent(&services, book.id).await;
}

#[tokio::test]
#[ignore]
async fn test_out_of_stock_leaves_no_loan_behind() {
    let services = db_services().await;
    let book = seed_book(&services, 1).await;
    let member = seed_member(&services).await;

    checkout_now(&services, member.id, book.id).await.unwrap();
    let rejected = checkout_now(&services, member.id, book.id).await;
    assert!(matches!(rejected, Err(AppError::OutOfStock(_))));

    let loans = services.members.member_loans(member.id).await.unwrap();
    assert_eq!(loans.len(), 1);
    assert_consistent(&services, book.id).await;
}

#[tokio::test]
#[ignore]
async fn test_checkout_unknown_member_or_book() {
    let services = db_services().await;
    let book = seed_book(&services, 1).await;
    let member = seed_member(&services).await;

    let no_member = checkout_now(&services, i32::MAX, book.id).await;
    assert!(matches!(no_member, Err(AppError::NotFound(_))));
    let no_book = checkout_now(&services, member.id, i32::MAX).await;
    assert!(matches!(no_book, Err(AppError::NotFound(_))));

    assert_eq!(available(&services, book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_checkouts_never_oversell() {
    let services = db_services().await;
    let copies = 3;
    let contenders = 12;
    let book = seed_book(&services, copies).await;

    let mut members = Vec::new();
    for _ in 0..contenders {
        members.push(seed_member(&services).await);
    }

    let mut set = JoinSet::new();
    for member in members {
        let services = services.clone();
        let book_id = book.id;
        set.spawn(async move { checkout_now(&services, member.id, book_id).await });
    }

    let mut granted = 0;
    let mut refused = 0;
    while let Some(outcome) = set.join_next().await {
        match outcome.unwrap() {
            Ok(_) => granted += 1,
            Err(AppError::OutOfStock(_)) => refused += 1,
            Err(e) => panic!("unexpected checkout failure: {}", e),
        }
    }

    assert_eq!(granted, copies);
    assert_eq!(refused, contenders - copies);
    assert_eq!(available(&services, book.id).await, 0);
    assert_consistent(&services, book.id).await;
}

#[tokio::test]
#[ignore]
async fn test_concurrent_returns_credit_once() {
    let services = db_services().await;
    let book = seed_book(&services, 2).await;
    let member = seed_member(&services).await;
    let loan_id = checkout_now(&services, member.id, book.id).await.unwrap();

    let mut set = JoinSet::new();
    for _ in 0..4 {
        let services = services.clone();
        set.spawn(async move { services.inventory.return_book(loan_id).await });
    }

    let mut returned = 0;
    while let Some(outcome) = set.join_next().await {
        match outcome.unwrap() {
            Ok(_) => returned += 1,
            Err(AppError::AlreadyReturned(_)) => {}
            Err(e) => panic!("unexpected return failure: {}", e),
        }
    }

    assert_eq!(returned, 1);
    assert_eq!(available(&services, book.id).await, 2);
}

#[tokio::test]
#[ignore]
async fn test_deleting_loans_reclaims_only_held_copies() {
    let services = db_services().await;
    let book = seed_book(&services, 2).await;
    let member = seed_member(&services).await;

    let open = checkout_now(&services, member.id, book.id).await.unwrap();
    let closed = checkout_now(&services, member.id, book.id).await.unwrap();
    services.inventory.return_book(closed).await.unwrap();
    assert_eq!(available(&services, book.id).await, 1);

    services.inventory.delete_loan_guarded(closed).await.unwrap();
    assert_eq!(available(&services, book.id).await, 1);

    services.inventory.delete_loan_guarded(open).await.unwrap();
    assert_eq!(available(&services, book.id).await, 2);

    let twice = services.inventory.delete_loan_guarded(open).await;
    assert!(matches!(twice, Err(AppError::NotFound(_))));
    assert_consistent(&services, book.id).await;
}

#[tokio::test]
#[ignore]
async fn test_concurrent_deletes_of_one_loan() {
    let services = db_services().await;
    let book = seed_book(&services, 1).await;
    let member = seed_member(&services).await;
    let loan_id = checkout_now(&services, member.id, book.id).await.unwrap();

    let (a, b) = tokio::join!(
        services.inventory.delete_loan_guarded(loan_id),
        services.inventory.delete_loan_guarded(loan_id)
    );
    assert!(a.is_ok() != b.is_ok());
    assert_eq!(available(&services, book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_delete_guards_on_loan_history() {
    let services = db_services().await;
    let book = seed_book(&services, 1).await;
    let member = seed_member(&services).await;
    let loan_id = checkout_now(&services, member.id, book.id).await.unwrap();
    services.inventory.return_book(loan_id).await.unwrap();

    let book_delete = services.inventory.delete_book_guarded(book.id).await;
    assert!(matches!(book_delete, Err(AppError::InUse(_))));
    let member_delete = services.inventory.delete_member_guarded(member.id).await;
    assert!(matches!(member_delete, Err(AppError::InUse(_))));

    let unused_book = seed_book(&services, 1).await;
    let unused_member = seed_member(&services).await;
    services.inventory.delete_book_guarded(unused_book.id).await.unwrap();
    services.inventory.delete_member_guarded(unused_member.id).await.unwrap();
    assert!(matches!(
        services.get_book(unused_book.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        services.get_member(unused_member.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_loan_edits_move_copies() {
    let services = db_services().await;
    let first = seed_book(&services, 1).await;
    let second = seed_book(&services, 1).await;
    let member = seed_member(&services).await;
    let loan_id = checkout_now(&services, member.id, first.id).await.unwrap();
    let loan = services.get_loan(loan_id).await.unwrap();

    let mut edit = UpdateLoan {
        member_id: member.id,
        book_id: second.id,
        loan_date: loan.loan_date,
        due_date: loan.due_date,
        return_date: None,
        status: LoanStatus::Borrowed,
        fine: None,
    };

    // Move the loan to another book
    services.inventory.update_loan(loan_id, &edit).await.unwrap();
    assert_eq!(available(&services, first.id).await, 1);
    assert_eq!(available(&services, second.id).await, 0);

    // Close it by edit; the copy comes back and a return date is filled in
    edit.status = LoanStatus::Returned;
    let closed = services.inventory.update_loan(loan_id, &edit).await.unwrap();
    assert_eq!(closed.return_date, Some(today()));
    assert_eq!(available(&services, second.id).await, 1);

    // Someone else takes the last copy, then un-returning must fail
    let other = seed_member(&services).await;
    checkout_now(&services, other.id, second.id).await.unwrap();
    edit.status = LoanStatus::Borrowed;
    let reopened = services.inventory.update_loan(loan_id, &edit).await;
    assert!(matches!(reopened, Err(AppError::OutOfStock(_))));
    assert_eq!(
        services.get_loan(loan_id).await.unwrap().status,
        LoanStatus::Returned
    );

    assert_consistent(&services, first.id).await;
    assert_consistent(&services, second.id).await;
}

#[tokio::test]
#[ignore]
async fn test_resizing_book_respects_copies_on_loan() {
    let services = db_services().await;
    let book = seed_book(&services, 3).await;
    let member = seed_member(&services).await;
    checkout_now(&services, member.id, book.id).await.unwrap();
    checkout_now(&services, member.id, book.id).await.unwrap();

    let shrink = UpdateBook {
        total_copies: Some(1),
        ..Default::default()
    };
    let refused = services.inventory.update_book(book.id, &shrink).await;
    assert!(matches!(refused, Err(AppError::Conflict(_))));

    let grow = UpdateBook {
        total_copies: Some(5),
        ..Default::default()
    };
    let grown = services.inventory.update_book(book.id, &grow).await.unwrap();
    assert_eq!(grown.total_copies, 5);
    assert_eq!(grown.available_copies, 3);
    assert_consistent(&services, book.id).await;
}

#[tokio::test]
#[ignore]
async fn test_overdue_is_derived_on_read() {
    let services = db_services().await;
    let book = seed_book(&services, 1).await;
    let member = seed_member(&services).await;

    let start = today() - Duration::days(30);
    let loan = services
        .inventory
        .checkout(member.id, book.id, start, start + Duration::days(14))
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Borrowed);

    assert_eq!(services.get_loan(loan.id).await.unwrap().status, LoanStatus::Overdue);

    let query = LoanQuery {
        status: Some(LoanStatus::Overdue),
        book_id: Some(book.id),
        ..Default::default()
    };
    let (overdue, total) = services.loans.list_loans(&query).await.unwrap();
    assert_eq!(total, 1);
    assert!(overdue[0].is_overdue);

    // An overdue loan still returns normally
    services.inventory.return_book(loan.id).await.unwrap();
    assert_eq!(available(&services, book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_unknown_category_rolls_back_book() {
    let services = db_services().await;
    let book = seed_book(&services, 1).await;

    let tagged = UpdateBook {
        total_copies: Some(4),
        category_ids: Some(vec![i32::MAX]),
        ..Default::default()
    };
    let result = services.inventory.update_book(book.id, &tagged).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(services.get_book(book.id).await.unwrap().total_copies, 1);
}

#[tokio::test]
#[ignore]
async fn test_audit_all_reports_every_book() {
    let services = db_services().await;
    let book = seed_book(&services, 2).await;
    let member = seed_member(&services).await;
    checkout_now(&services, member.id, book.id).await.unwrap();

    let reports = services.inventory.audit_all().await.unwrap();
    let ours = reports.iter().find(|r| r.book_id == book.id).unwrap();
    assert_eq!(ours.copies_on_loan, 1);
    assert!(reports.iter().all(|r| r.consistent));
}
