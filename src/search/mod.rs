//! Catalog search and ranking
//!
//! A book matches a query when its weighted trigram similarity reaches the
//! configured threshold, when the query is a substring of its title, author
//! or ISBN, or when every query term occurs in its weighted document.
//! Matches are ranked by full-text rank, then by weighted similarity.
//!
//! The PostgreSQL book store expresses the same rules in SQL with
//! `pg_trgm` and a generated `tsvector` column; this module is used by the
//! in-memory store and by the tests that pin the behaviour down.

pub mod ordering;
pub mod trigram;

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::SearchMode;
use crate::models::book::{Book, CatalogQuery};

use self::trigram::{similarity_of, trigrams, words, Trigram};

// Per-field multipliers applied to trigram similarity
pub const TITLE_WEIGHT: f64 = 1.5;
pub const AUTHOR_WEIGHT: f64 = 1.3;
pub const ISBN_WEIGHT: f64 = 1.2;
pub const GENRE_WEIGHT: f64 = 1.0;
pub const DESCRIPTION_WEIGHT: f64 = 0.8;

// Full-text document weights (title/author A, isbn/genre B, description C)
const RANK_A: f64 = 1.0;
const RANK_B: f64 = 0.4;
const RANK_C: f64 = 0.2;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "was", "with",
];

/// How well one book matches a query
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BookScore {
    /// Highest weighted trigram similarity across fields
    pub combined: f64,
    /// Full-text rank; zero unless every term occurs in the document
    pub rank: f64,
    /// Query is a case-insensitive substring of title, author or ISBN
    pub contains: bool,
}

impl BookScore {
    pub fn is_match(&self, threshold: f64) -> bool {
        self.combined >= threshold || self.contains || self.rank > 0.0
    }
}

/// A prepared search query
#[derive(Debug, Clone)]
pub struct SearchQuery {
    lowered: String,
    grams: HashSet<Trigram>,
    terms: Vec<String>,
}

impl SearchQuery {
    /// Returns `None` for a blank query
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut terms: Vec<String> = words(trimmed)
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .collect();
        terms.sort();
        terms.dedup();
        Some(Self {
            lowered: trimmed.to_lowercase(),
            grams: trigrams(trimmed),
            terms,
        })
    }

    pub fn score(&self, book: &Book) -> BookScore {
        let weighted = [
            (book.title.as_str(), TITLE_WEIGHT),
            (book.author.as_str(), AUTHOR_WEIGHT),
            (book.isbn.as_str(), ISBN_WEIGHT),
            (book.genre.as_str(), GENRE_WEIGHT),
            (book.description.as_str(), DESCRIPTION_WEIGHT),
        ];
        let combined = weighted
            .iter()
            .map(|(text, weight)| similarity_of(&self.grams, &trigrams(text)) * weight)
            .fold(0.0, f64::max);

        let contains = [&book.title, &book.author, &book.isbn]
            .iter()
            .any(|field| field.to_lowercase().contains(&self.lowered));

        BookScore {
            combined,
            rank: self.rank(book),
            contains,
        }
    }

    fn rank(&self, book: &Book) -> f64 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let fields: [(HashSet<String>, f64); 3] = [
            (words(&book.title).chain(words(&book.author)).collect(), RANK_A),
            (words(&book.isbn).chain(words(&book.genre)).collect(), RANK_B),
            (words(&book.description).collect(), RANK_C),
        ];
        let mut total = 0.0;
        for term in &self.terms {
            let best = fields
                .iter()
                .filter(|(doc, _)| doc.contains(term))
                .map(|(_, weight)| *weight)
                .fold(0.0, f64::max);
            if best == 0.0 {
                return 0.0;
            }
            total += best;
        }
        total / self.terms.len() as f64
    }
}

/// Case-insensitive substring match over every searchable field
pub fn basic_match(book: &Book, raw: &str) -> bool {
    let needle = raw.trim().to_lowercase();
    [
        &book.title,
        &book.author,
        &book.isbn,
        &book.genre,
        &book.description,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
}

/// Keep the books matching `query` and return them best first
pub fn rank_books(books: Vec<Book>, query: &SearchQuery, threshold: f64) -> Vec<Book> {
    let mut scored: Vec<(BookScore, Book)> = books
        .into_iter()
        .map(|book| (query.score(&book), book))
        .filter(|(score, _)| score.is_match(threshold))
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        sb.rank
            .partial_cmp(&sa.rank)
            .unwrap_or(Ordering::Equal)
            .then_with(|| sb.combined.partial_cmp(&sa.combined).unwrap_or(Ordering::Equal))
            .then_with(|| ordering::newest_first(a, b))
    });
    scored.into_iter().map(|(_, book)| book).collect()
}

/// Evaluate a full catalog query over a set of books: filter, search, order
/// and paginate. Returns the page and the total number of matches.
pub fn run_catalog_query(books: Vec<Book>, query: &CatalogQuery) -> (Vec<Book>, i64) {
    let filtered: Vec<Book> = books
        .into_iter()
        .filter(|book| query.filters.matches(book))
        .collect();

    let search = query.search.as_deref().and_then(SearchQuery::new);
    let mut matched = match (&search, query.mode) {
        (Some(prepared), SearchMode::Ranked) => rank_books(filtered, prepared, query.threshold),
        (Some(_), SearchMode::Basic) => {
            let raw = query.search.as_deref().unwrap_or_default();
            let mut books: Vec<Book> = filtered.into_iter().filter(|b| basic_match(b, raw)).collect();
            books.sort_by(ordering::newest_first);
            books
        }
        (None, _) => {
            let mut books = filtered;
            books.sort_by(ordering::newest_first);
            books
        }
    };

    if !query.ordering.is_empty() {
        matched.sort_by(|a, b| ordering::compare_books(a, b, &query.ordering));
    }

    let total = matched.len() as i64;
    let page = matched
        .into_iter()
        .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(query.per_page).unwrap_or(0))
        .collect();
    (page, total)
}
