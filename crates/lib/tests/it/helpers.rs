use std::sync::Arc;

use folio::{
    FixedClock, RevisionConfig, Revisions,
    backend::{BackendImpl, Document, database::InMemory},
    content::Node,
};

/// 2024-01-01 00:00:00 UTC
pub const START_MS: u64 = 1_704_067_200_000;

/// Creates a test backend based on TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory backend (default)
/// - "sqlite": SQLite in-memory backend (requires `sqlite` feature)
/// - "postgres": PostgreSQL backend in an isolated schema (requires `postgres`
///   feature and TEST_POSTGRES_URL)
///
/// # Example
/// ```bash
/// TEST_BACKEND=sqlite cargo test --features sqlite
/// ```
pub async fn test_backend() -> Box<dyn BackendImpl> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use folio::backend::database::SqlxBackend;
                Box::new(
                    SqlxBackend::sqlite_in_memory()
                        .await
                        .expect("Failed to create SQLite backend"),
                )
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("postgres") => {
            #[cfg(feature = "postgres")]
            {
                use folio::backend::database::SqlxBackend;
                let url = std::env::var("TEST_POSTGRES_URL")
                    .unwrap_or_else(|_| "postgres://localhost/folio_test".to_string());
                Box::new(
                    SqlxBackend::connect_postgres_isolated(&url)
                        .await
                        .expect("Failed to connect to PostgreSQL"),
                )
            }
            #[cfg(not(feature = "postgres"))]
            {
                panic!("TEST_BACKEND=postgres requires the 'postgres' feature to be enabled")
            }
        }
        Ok("inmemory") | Ok("") | Err(_) => Box::new(InMemory::new()),
        Ok(other) => {
            panic!("Unknown TEST_BACKEND value: {other}. Supported: inmemory, sqlite, postgres")
        }
    }
}

/// A revision service over the test backend with a manually advanced clock.
pub async fn test_revisions() -> (Revisions, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(START_MS));
    let revisions = Revisions::open_with_clock(test_backend().await, RevisionConfig::default(), clock.clone())
        .expect("Default config is valid");
    (revisions, clock)
}

/// A revision service with a freshly created essay document.
pub async fn revisions_with_essay(paragraphs: usize) -> (Revisions, Arc<FixedClock>, Document) {
    let (revisions, clock) = test_revisions().await;
    let document = revisions
        .create_document(essay(paragraphs))
        .await
        .expect("Failed to create document");
    (revisions, clock, document)
}

pub fn paragraph(i: usize) -> Node {
    Node::map([
        ("type", Node::from("paragraph")),
        (
            "text",
            Node::from(format!(
                "Paragraph {i} explains how chloroplasts turn light, water and carbon dioxide into sugar."
            )),
        ),
    ])
}

/// A document body shaped like an editor's: a title and a list of blocks.
pub fn essay(paragraphs: usize) -> Node {
    essay_with((0..paragraphs).map(paragraph).collect())
}

pub fn essay_with(blocks: Vec<Node>) -> Node {
    Node::map([
        ("title", Node::from("Photosynthesis")),
        ("blocks", Node::list(blocks)),
    ])
}

/// `essay(paragraphs)` with paragraph `index` rewritten.
pub fn essay_edited(paragraphs: usize, index: usize, text: &str) -> Node {
    let mut blocks: Vec<Node> = (0..paragraphs).map(paragraph).collect();
    blocks[index] = Node::map([("type", Node::from("paragraph")), ("text", Node::from(text))]);
    essay_with(blocks)
}
