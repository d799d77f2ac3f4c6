//! Catalog management service

use validator::Validate;

use crate::{
    config::{CatalogConfig, SearchConfig},
    error::AppResult,
    models::{
        book::{normalize_isbn, Book, BookFilters, BookQuery, CatalogQuery, CreateBook, UpdateBook},
        user::Identity,
        PaginatedResponse,
    },
    repository::Repository,
    search::ordering::parse_ordering,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    search: SearchConfig,
    catalog: CatalogConfig,
}

impl CatalogService {
    pub fn new(repository: Repository, search: SearchConfig, catalog: CatalogConfig) -> Self {
        Self {
            repository,
            search,
            catalog,
        }
    }

    /// Turn request parameters into a store query
    pub fn resolve_query(&self, query: BookQuery) -> CatalogQuery {
        let per_page = query
            .page_size
            .unwrap_or(self.catalog.default_page_size)
            .clamp(1, self.catalog.max_page_size);

        CatalogQuery {
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            mode: self.search.mode,
            threshold: self.search.trigram_threshold,
            filters: BookFilters {
                title: query.title,
                author: query.author,
                genre: query.genre,
                isbn: query.isbn.as_deref().map(normalize_isbn),
                published_year: query.published_year,
                is_available: query.is_available,
            },
            ordering: query
                .ordering
                .as_deref()
                .map(parse_ordering)
                .unwrap_or_default(),
            page: query.page.unwrap_or(1).max(1),
            per_page,
        }
    }

    /// Search, filter, order and paginate books
    pub async fn list_books(&self, query: BookQuery) -> AppResult<PaginatedResponse<Book>> {
        let query = self.resolve_query(query);
        let (items, total) = self.repository.books.search(&query).await?;
        Ok(PaginatedResponse {
            items,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }

    pub async fn get_book(&self, id: i64) -> AppResult<Book> {
        self.repository.books.get(id).await
    }

    pub async fn create_book(&self, actor: &Identity, mut book: CreateBook) -> AppResult<Book> {
        actor.require_admin()?;
        book.validate()?;
        book.isbn = normalize_isbn(&book.isbn);

        let created = self.repository.books.create(&book).await?;
        tracing::info!("Book {} created (isbn {})", created.id, created.isbn);
        Ok(created)
    }

    pub async fn update_book(&self, actor: &Identity, id: i64, mut changes: UpdateBook) -> AppResult<Book> {
        actor.require_admin()?;
        changes.validate()?;
        changes.isbn = changes.isbn.as_deref().map(normalize_isbn);

        self.repository.books.update(id, &changes).await
    }

    pub async fn delete_book(&self, actor: &Identity, id: i64) -> AppResult<()> {
        actor.require_admin()?;
        self.repository.books.delete(id).await?;
        tracing::info!("Book {} deleted", id);
        Ok(())
    }
}
