// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use bookhub_api::{ApiResponse, Client};
use bookhub_app::{
    Book, BookFormInput, Loan, LoanDraft, LoanRequest, ReturnRequest, TabKind, User, UserFormInput,
    UserId,
};
use bookhub_tui::{AppRuntime, InternalEvent};
use serde::Serialize;
use std::sync::mpsc::Sender;
use std::thread;

/// HTTP-backed runtime. Holds only a cloneable client, so fetch workers
/// can run on their own threads without sharing state.
pub struct ApiRuntime {
    client: Client,
}

impl ApiRuntime {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// User payload without the server-assigned id.
#[derive(Debug, Serialize)]
struct UserBody<'a> {
    #[serde(rename = "nombre")]
    name: &'a str,
    email: &'a str,
    #[serde(rename = "telefono")]
    phone: &'a str,
}

fn ensure_success(response: ApiResponse) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        bail!("{}", response.user_message());
    }
}

fn book_body(form: &BookFormInput, isbn: &str) -> Result<Book> {
    form.validate()?;
    let Some(category) = form.category.clone() else {
        bail!("category is required -- choose a category and retry");
    };
    Ok(Book {
        isbn: isbn.trim().to_owned(),
        title: form.title.trim().to_owned(),
        author: form.author.trim().to_owned(),
        category,
        available: form.available,
    })
}

impl AppRuntime for ApiRuntime {
    fn fetch_books(&mut self) -> Result<Vec<Book>> {
        Ok(self.client.get_list("/libros")?)
    }

    fn fetch_users(&mut self) -> Result<Vec<User>> {
        Ok(self.client.get_list("/usuarios")?)
    }

    fn fetch_active_loans(&mut self) -> Result<Vec<Loan>> {
        Ok(self.client.get_list("/api/prestamos/activos")?)
    }

    fn fetch_loan_history(&mut self) -> Result<Vec<Loan>> {
        Ok(self.client.get_list("/api/prestamos/todos")?)
    }

    fn create_book(&mut self, form: &BookFormInput) -> Result<()> {
        let body = book_body(form, &form.isbn)?;
        ensure_success(self.client.post("/libros", &body)?)
    }

    fn update_book(&mut self, isbn: &str, form: &BookFormInput) -> Result<()> {
        // The path and body both carry the original key; the form cannot
        // rename a book.
        let body = book_body(form, isbn)?;
        ensure_success(self.client.put(&format!("/libros/{isbn}"), &body)?)
    }

    fn delete_book(&mut self, isbn: &str) -> Result<()> {
        ensure_success(self.client.delete(&format!("/libros/{isbn}"))?)
    }

    fn create_user(&mut self, form: &UserFormInput) -> Result<()> {
        form.validate()?;
        let body = UserBody {
            name: form.name.trim(),
            email: form.email.trim(),
            phone: form.phone.trim(),
        };
        ensure_success(self.client.post("/usuarios", &body)?)
    }

    fn update_user(&mut self, id: UserId, form: &UserFormInput) -> Result<()> {
        form.validate()?;
        let body = UserBody {
            name: form.name.trim(),
            email: form.email.trim(),
            phone: form.phone.trim(),
        };
        ensure_success(self.client.put(&format!("/usuarios/{}", id.get()), &body)?)
    }

    fn delete_user(&mut self, id: UserId) -> Result<()> {
        ensure_success(self.client.delete(&format!("/usuarios/{}", id.get()))?)
    }

    fn create_loan(&mut self, draft: &LoanDraft) -> Result<()> {
        let body = LoanRequest {
            user_id: draft.user_id,
            isbn: draft.isbn.clone(),
            loan_date: draft.loan_date,
            due_date: draft.due_date,
        };
        ensure_success(self.client.post("/api/prestamos/registrar", &body)?)
    }

    fn return_loan(&mut self, user_id: UserId, isbn: &str) -> Result<()> {
        let body = ReturnRequest {
            user_id,
            isbn: isbn.to_owned(),
        };
        ensure_success(self.client.put("/api/prestamos/devolver", &body)?)
    }

    fn spawn_fetch(
        &mut self,
        request_id: u64,
        tab: TabKind,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self.client.clone();
        thread::spawn(move || {
            let mut worker = ApiRuntime::new(client);
            let outcome = match worker.fetch_snapshot(tab) {
                Ok(snapshot) => Ok(snapshot),
                Err(error) => Err(error.to_string()),
            };
            let _ = tx.send(InternalEvent::FetchCompleted {
                request_id,
                outcome,
            });
        });
        Ok(())
    }
}
