// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{Book, Loan, User};

/// Row types that a free-text filter can match against. The needle is
/// already lowercased; implementations compare a fixed set of fields as
/// plain substrings, so characters that are regex metacharacters elsewhere
/// carry no meaning here.
pub trait Searchable {
    fn matches(&self, needle: &str) -> bool;
}

impl Searchable for Book {
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.author.to_lowercase().contains(needle)
    }
}

impl Searchable for User {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.email.to_lowercase().contains(needle)
    }
}

impl Searchable for Loan {
    fn matches(&self, needle: &str) -> bool {
        self.isbn.to_lowercase().contains(needle)
            || self.status.as_str().to_lowercase().contains(needle)
    }
}

/// Indices of the rows a query keeps visible, in cache order. A blank
/// query keeps everything; the backing list is never touched.
pub fn filter_indices<T: Searchable>(query: &str, items: &[T]) -> Vec<usize> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return (0..items.len()).collect();
    }

    let needle = trimmed.to_lowercase();
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.matches(&needle))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Searchable, filter_indices};
    use crate::{Book, Category};

    fn book(isbn: &str, title: &str, author: &str) -> Book {
        Book {
            isbn: isbn.to_owned(),
            title: title.to_owned(),
            author: author.to_owned(),
            category: Category::Literatura,
            available: true,
        }
    }

    fn shelf() -> Vec<Book> {
        vec![
            book("978-1", "Rayuela", "Julio Cortazar"),
            book("978-2", "Ficciones", "Jorge Luis Borges"),
            book("978-3", "2666", "Roberto Bolano"),
        ]
    }

    #[test]
    fn blank_query_keeps_every_row_in_order() {
        let books = shelf();
        assert_eq!(filter_indices("", &books), vec![0, 1, 2]);
        assert_eq!(filter_indices("   ", &books), vec![0, 1, 2]);
    }

    #[test]
    fn query_matches_title_or_author_case_insensitively() {
        let books = shelf();
        assert_eq!(filter_indices("RAYUELA", &books), vec![0]);
        assert_eq!(filter_indices("borges", &books), vec![1]);
        assert_eq!(filter_indices("jo", &books), vec![1]);
    }

    #[test]
    fn metacharacters_match_literally() {
        let mut books = shelf();
        books.push(book("978-4", "C++ (primer)", "Lippman"));
        assert_eq!(filter_indices("c++ (", &books), vec![3]);
        // A dot is a dot, not a wildcard.
        assert!(filter_indices("r.y", &books).is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let books = shelf();
        let once = filter_indices("o", &books);
        let subset: Vec<Book> = once.iter().map(|&index| books[index].clone()).collect();
        let twice = filter_indices("o", &subset);
        assert_eq!(twice.len(), once.len());
        for (position, &index) in twice.iter().enumerate() {
            assert!(subset[index].matches("o"));
            assert_eq!(index, position);
        }
    }
}
