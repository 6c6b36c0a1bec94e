use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatcherError {
    /// The query was empty or whitespace-only. Caller input error, not a
    /// backend fault.
    #[error("match query is empty")]
    EmptyQuery,

    #[error("embedding provider error: {0}")]
    Embedder(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error(transparent)]
    Db(#[from] pantrydb_db::DbError),
}
