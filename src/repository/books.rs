//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    config::SearchMode,
    error::{AppError, AppResult},
    models::book::{Book, CatalogQuery, CreateBook, UpdateBook},
    search::{
        ordering::order_by_sql, AUTHOR_WEIGHT, DESCRIPTION_WEIGHT, GENRE_WEIGHT, ISBN_WEIGHT,
        TITLE_WEIGHT,
    },
};

use super::BookStore;

const BOOK_COLUMNS: &str = "id, title, author, isbn, description, page_count, genre, \
                            published_date, is_available, created_at, updated_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Push `FROM ... WHERE ...` for a catalog query.
///
/// Ranked searches select from a subquery that carries `combined`
/// (weighted trigram similarity) and `rank` (full-text rank) so the caller
/// can order by them.
fn push_source(qb: &mut QueryBuilder<'_, Postgres>, query: &CatalogQuery) {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    match (&search, query.mode) {
        (Some(q), SearchMode::Ranked) => {
            qb.push(" FROM (SELECT *, GREATEST(");
            let weighted = [
                ("title", TITLE_WEIGHT),
                ("author", AUTHOR_WEIGHT),
                ("isbn", ISBN_WEIGHT),
                ("genre", GENRE_WEIGHT),
                ("description", DESCRIPTION_WEIGHT),
            ];
            for (i, (column, weight)) in weighted.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(format!("similarity({}, ", column))
                    .push_bind(q.clone())
                    .push(format!(") * {}", weight));
            }
            qb.push(") AS combined, ts_rank(search_vector, plainto_tsquery('english', ")
                .push_bind(q.clone())
                .push(")) AS rank FROM books) b WHERE (b.combined >= ")
                .push_bind(query.threshold)
                .push(" OR b.search_vector @@ plainto_tsquery('english', ")
                .push_bind(q.clone())
                .push(")");
            for column in ["title", "author", "isbn"] {
                qb.push(format!(" OR strpos(lower(b.{}), lower(", column))
                    .push_bind(q.clone())
                    .push(")) > 0");
            }
            qb.push(")");
        }
        (Some(q), SearchMode::Basic) => {
            qb.push(" FROM books b WHERE (FALSE");
            for column in ["title", "author", "isbn", "genre", "description"] {
                qb.push(format!(" OR strpos(lower(b.{}), lower(", column))
                    .push_bind(q.clone())
                    .push(")) > 0");
            }
            qb.push(")");
        }
        (None, _) => {
            qb.push(" FROM books b WHERE TRUE");
        }
    }

    let filters = &query.filters;
    for (column, value) in [
        ("title", &filters.title),
        ("author", &filters.author),
        ("genre", &filters.genre),
    ] {
        if let Some(value) = value {
            qb.push(format!(" AND strpos(lower(b.{}), lower(", column))
                .push_bind(value.clone())
                .push(")) > 0");
        }
    }
    if let Some(isbn) = &filters.isbn {
        qb.push(" AND b.isbn = ").push_bind(isbn.clone());
    }
    if let Some(year) = filters.published_year {
        qb.push(" AND EXTRACT(YEAR FROM b.published_date)::int = ")
            .push_bind(year);
    }
    if let Some(available) = filters.is_available {
        qb.push(" AND b.is_available = ").push_bind(available);
    }
}

fn is_ranked(query: &CatalogQuery) -> bool {
    query.mode == SearchMode::Ranked
        && query
            .search
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn get(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn search(&self, query: &CatalogQuery) -> AppResult<(Vec<Book>, i64)> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
        push_source(&mut count_qb, query);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = QueryBuilder::new(format!("SELECT {}", BOOK_COLUMNS));
        push_source(&mut qb, query);
        qb.push(" ORDER BY ");
        if !query.ordering.is_empty() {
            qb.push(order_by_sql(&query.ordering));
        } else if is_ranked(query) {
            qb.push("rank DESC, combined DESC, created_at DESC, id DESC");
        } else {
            qb.push("created_at DESC, id DESC");
        }
        qb.push(" LIMIT ")
            .push_bind(query.per_page)
            .push(" OFFSET ")
            .push_bind(query.offset());

        let books = qb.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok((books, total))
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, isbn, description, page_count, genre, published_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.description)
        .bind(book.page_count)
        .bind(&book.genre)
        .bind(book.published_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn update(&self, id: i64, changes: &UpdateBook) -> AppResult<Book> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE books SET updated_at = NOW()");
        if let Some(ref title) = changes.title {
            qb.push(", title = ").push_bind(title.clone());
        }
        if let Some(ref author) = changes.author {
            qb.push(", author = ").push_bind(author.clone());
        }
        if let Some(ref isbn) = changes.isbn {
            qb.push(", isbn = ").push_bind(isbn.clone());
        }
        if let Some(ref description) = changes.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(page_count) = changes.page_count {
            qb.push(", page_count = ").push_bind(page_count);
        }
        if let Some(ref genre) = changes.genre {
            qb.push(", genre = ").push_bind(genre.clone());
        }
        if let Some(published_date) = changes.published_date {
            qb.push(", published_date = ").push_bind(published_date);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", BOOK_COLUMNS));

        qb.build_query_as::<Book>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        let has_loans: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if has_loans {
            return Err(AppError::Conflict(
                "This book has loan history and cannot be deleted.".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }
}
