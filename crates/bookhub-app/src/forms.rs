// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::BTreeSet;
use time::macros::format_description;
use time::{Date, Duration};

use crate::{Category, UserId};

pub const DATE_LAYOUT: &str = "YYYY-MM-DD";

/// Longest allowed loan, inclusive of the last day.
pub const MAX_LOAN_DAYS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Book,
    User,
    Loan,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BookFormInput {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub category: Option<Category>,
    pub available: bool,
}

impl BookFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.isbn.trim().is_empty() {
            bail!("ISBN is required -- enter an ISBN and retry");
        }
        if self.title.trim().is_empty() {
            bail!("title is required -- enter a title and retry");
        }
        if self.author.trim().is_empty() {
            bail!("author is required -- enter an author and retry");
        }
        if self.category.is_none() {
            bail!("category is required -- choose a category and retry");
        }
        Ok(())
    }

    /// Duplicate check against the ISBNs currently cached on this client.
    /// The server stays authoritative and may still answer 409 for an ISBN
    /// this client has not seen.
    pub fn ensure_new_isbn(&self, existing: &BTreeSet<String>) -> Result<()> {
        if existing.contains(self.isbn.trim()) {
            bail!("a book with ISBN {} already exists", self.isbn.trim());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserFormInput {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl UserFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name is required -- enter a name and retry");
        }
        if !is_valid_email(self.email.trim()) {
            bail!("email must look like local@domain");
        }
        if !is_valid_phone(self.phone.trim()) {
            bail!("phone must be 7-15 digits");
        }
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '_' | '.' | '-'));
    let domain_ok = !domain.is_empty()
        && !domain.contains('@')
        && domain
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-'));
    local_ok && domain_ok
}

fn is_valid_phone(phone: &str) -> bool {
    (7..=15).contains(&phone.len()) && phone.chars().all(|ch| ch.is_ascii_digit())
}

/// Raw loan form text, validated into a [`LoanDraft`] before any network
/// call. The borrower reference is a shape check only (digits), not an
/// identity check; the server decides whether the user exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoanFormInput {
    pub user_id: String,
    pub isbn: String,
    pub due_date: String,
}

/// A validated loan ready to submit; the loan date is the client's today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanDraft {
    pub user_id: UserId,
    pub isbn: String,
    pub loan_date: Date,
    pub due_date: Date,
}

impl LoanFormInput {
    pub fn validate(&self, today: Date) -> Result<LoanDraft> {
        let user_id = self.user_id.trim();
        let isbn = self.isbn.trim();
        let due_raw = self.due_date.trim();

        if user_id.is_empty() || isbn.is_empty() || due_raw.is_empty() {
            bail!("all fields are required -- user id, ISBN, and due date");
        }
        if !user_id.chars().all(|ch| ch.is_ascii_digit()) {
            bail!("user id must be digits only");
        }
        let user_id: i64 = match user_id.parse() {
            Ok(value) => value,
            Err(_) => bail!("user id must be digits only"),
        };

        let due_date = match Date::parse(due_raw, &format_description!("[year]-[month]-[day]")) {
            Ok(date) => date,
            Err(_) => bail!("due date must use the {DATE_LAYOUT} format"),
        };

        if due_date < today {
            bail!("due date cannot be before today");
        }
        if due_date > today + Duration::days(MAX_LOAN_DAYS) {
            bail!("due date cannot be more than {MAX_LOAN_DAYS} days out");
        }

        Ok(LoanDraft {
            user_id: UserId::new(user_id),
            isbn: isbn.to_owned(),
            loan_date: today,
            due_date,
        })
    }
}
