// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::Date;

use crate::ids::*;

// Calendar dates travel as yyyy-MM-dd on the wire.
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Book category. The server stores a plain string; values outside the
/// fixed set (legacy rows predating the category list) are preserved
/// verbatim so an edit round-trip never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Literatura,
    Tecnologia,
    Ciencia,
    Historia,
    Infantil,
    Arte,
    Otro,
    Legacy(String),
}

impl Category {
    pub const KNOWN: [Self; 7] = [
        Self::Literatura,
        Self::Tecnologia,
        Self::Ciencia,
        Self::Historia,
        Self::Infantil,
        Self::Arte,
        Self::Otro,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Literatura => "Literatura",
            Self::Tecnologia => "Tecnologia",
            Self::Ciencia => "Ciencia",
            Self::Historia => "Historia",
            Self::Infantil => "Infantil",
            Self::Arte => "Arte",
            Self::Otro => "Otro",
            Self::Legacy(value) => value,
        }
    }

    pub fn parse(value: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(value))
            .cloned()
            .unwrap_or_else(|| Self::Legacy(value.to_owned()))
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_owned()
    }
}

/// Loan state as reported by the server. Only `Activo` is actionable for
/// return; every other value is displayed as-is and left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoanStatus {
    Activo,
    Devuelto,
    Otro(String),
}

impl LoanStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Activo => "ACTIVO",
            Self::Devuelto => "DEVUELTO",
            Self::Otro(value) => value,
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("activo") {
            Self::Activo
        } else if value.eq_ignore_ascii_case("devuelto") {
            Self::Devuelto
        } else {
            Self::Otro(value.to_owned())
        }
    }

    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Activo)
    }
}

impl From<String> for LoanStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<LoanStatus> for String {
    fn from(value: LoanStatus) -> Self {
        value.as_str().to_owned()
    }
}

/// Catalog entry. The ISBN is the stable key and never changes after
/// creation; edits go to `PUT /libros/{isbn}` with the original key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub isbn: String,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "autor")]
    pub author: String,
    #[serde(rename = "categoria")]
    pub category: Category,
    #[serde(rename = "disponible")]
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    #[serde(rename = "telefono")]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    #[serde(rename = "usuarioId")]
    pub user_id: UserId,
    #[serde(rename = "libroIsbn")]
    pub isbn: String,
    #[serde(rename = "fechaPrestamo", with = "iso_date")]
    pub loan_date: Date,
    #[serde(rename = "fechaDevolucion", with = "iso_date")]
    pub due_date: Date,
    #[serde(rename = "estado")]
    pub status: LoanStatus,
}

/// Body for `POST /api/prestamos/registrar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanRequest {
    #[serde(rename = "usuarioId")]
    pub user_id: UserId,
    pub isbn: String,
    #[serde(rename = "fechaPrestamo", with = "iso_date")]
    pub loan_date: Date,
    #[serde(rename = "fechaDevolucion", with = "iso_date")]
    pub due_date: Date,
}

/// Body for `PUT /api/prestamos/devolver`; the server keys returns by
/// borrower plus book, not by loan id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnRequest {
    #[serde(rename = "usuarioId")]
    pub user_id: UserId,
    #[serde(rename = "libroIsbn")]
    pub isbn: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabKind {
    Books,
    Users,
    Loans,
    History,
}

impl TabKind {
    pub const ALL: [Self; 4] = [Self::Books, Self::Users, Self::Loans, Self::History];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::Users => "users",
            Self::Loans => "loans",
            Self::History => "history",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Book, Category, Loan, LoanRequest, LoanStatus, TabKind};
    use crate::ids::{LoanId, UserId};
    use anyhow::Result;
    use time::{Date, Month};

    #[test]
    fn category_round_trips_known_and_legacy_values() {
        assert_eq!(Category::parse("Tecnologia"), Category::Tecnologia);
        assert_eq!(Category::parse("historia"), Category::Historia);

        let legacy = Category::parse("Novela grafica");
        assert_eq!(legacy, Category::Legacy("Novela grafica".to_owned()));
        assert_eq!(legacy.as_str(), "Novela grafica");
    }

    #[test]
    fn loan_status_treats_only_activo_as_actionable() {
        assert!(LoanStatus::parse("ACTIVO").is_active());
        assert!(LoanStatus::parse("activo").is_active());
        assert!(!LoanStatus::parse("DEVUELTO").is_active());
        assert!(!LoanStatus::parse("VENCIDO").is_active());
    }

    #[test]
    fn book_decodes_server_field_names() -> Result<()> {
        let book: Book = serde_json::from_str(
            r#"{"isbn":"978-0","titulo":"Rayuela","autor":"Cortazar","categoria":"Literatura","disponible":true}"#,
        )?;
        assert_eq!(book.title, "Rayuela");
        assert_eq!(book.category, Category::Literatura);
        assert!(book.available);
        Ok(())
    }

    #[test]
    fn loan_dates_use_iso_calendar_format() -> Result<()> {
        let loan: Loan = serde_json::from_str(
            r#"{"id":7,"usuarioId":3,"libroIsbn":"978-0","fechaPrestamo":"2026-08-23","fechaDevolucion":"2026-09-07","estado":"ACTIVO"}"#,
        )?;
        assert_eq!(loan.id, LoanId::new(7));
        assert_eq!(
            loan.due_date,
            Date::from_calendar_date(2026, Month::September, 7)?
        );
        assert_eq!(loan.status, LoanStatus::Activo);
        Ok(())
    }

    #[test]
    fn loan_request_serializes_wire_names() -> Result<()> {
        let request = LoanRequest {
            user_id: UserId::new(3),
            isbn: "978-0".to_owned(),
            loan_date: Date::from_calendar_date(2026, Month::August, 23)?,
            due_date: Date::from_calendar_date(2026, Month::September, 7)?,
        };
        let encoded = serde_json::to_string(&request)?;
        assert!(encoded.contains("\"usuarioId\":3"));
        assert!(encoded.contains("\"fechaPrestamo\":\"2026-08-23\""));
        assert!(encoded.contains("\"fechaDevolucion\":\"2026-09-07\""));
        Ok(())
    }

    #[test]
    fn tab_labels_are_stable() {
        assert_eq!(TabKind::Books.label(), "books");
        assert_eq!(TabKind::ALL.len(), 4);
    }
}
