use std::sync::Arc;

use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;

use lexrag::config::parse_config;
use lexrag::sqlite_store::{SqliteChunkRepository, SqliteDocumentRepository, SqliteVectorIndex};
use lexrag::{app, db, migrate};
use lexrag_core::index::VectorIndex;
use lexrag_core::store::{ChunkRepository, DocumentRepository};
use lexrag_core::{Chunk, Document, DocumentStatus, Filters, Metadata, RagError, SearchQuery};

async fn setup_pool() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("data/lexrag.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, pool)
}

fn metadata(document_id: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("document_id".into(), Value::from(document_id));
    m
}

#[tokio::test]
async fn test_document_crud() {
    let (_tmp, pool) = setup_pool().await;
    let repo = SqliteDocumentRepository::new(pool);

    let first = repo.add(Document::new("Lease", "uploads/lease.txt")).await.unwrap();
    let second = repo.add(Document::new("NDA", "uploads/nda.txt")).await.unwrap();
    let first_id = first.id.clone().unwrap();

    let mut loaded = repo.get(&first_id).await.unwrap().unwrap();
    assert_eq!(loaded.title, "Lease");
    assert_eq!(loaded.status, DocumentStatus::Pending);
    assert_eq!(
        loaded.uploaded_at.timestamp_millis(),
        first.uploaded_at.timestamp_millis()
    );

    let listed: Vec<_> = repo.list().await.unwrap().into_iter().map(|d| d.id).collect();
    assert_eq!(listed, vec![first.id.clone(), second.id.clone()]);

    loaded.fail("embedder unreachable").unwrap();
    repo.update(&loaded).await.unwrap();
    let reloaded = repo.get(&first_id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, DocumentStatus::Failed);
    assert_eq!(reloaded.error.as_deref(), Some("embedder unreachable"));
    assert_eq!(
        reloaded.status_changed_at.timestamp_millis(),
        loaded.status_changed_at.timestamp_millis()
    );
    assert!(reloaded.status_changed_at >= first.status_changed_at);

    assert!(repo.delete(&first_id).await.unwrap());
    assert!(!repo.delete(&first_id).await.unwrap());
    assert!(repo.get(&first_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_document_add_and_update_guards() {
    let (_tmp, pool) = setup_pool().await;
    let repo = SqliteDocumentRepository::new(pool);

    let persisted = repo.add(Document::new("Lease", "lease.txt")).await.unwrap();
    assert!(matches!(repo.add(persisted).await, Err(RagError::Input(_))));

    let mut ghost = Document::new("Ghost", "ghost.txt");
    ghost.id = Some("missing".into());
    assert!(matches!(repo.update(&ghost).await, Err(RagError::NotFound(_))));
}

#[tokio::test]
async fn test_chunks_round_trip_in_position_order() {
    let (_tmp, pool) = setup_pool().await;
    let documents = SqliteDocumentRepository::new(pool.clone());
    let chunks = SqliteChunkRepository::new(pool);
    let doc_id = documents
        .add(Document::new("Lease", "lease.txt"))
        .await
        .unwrap()
        .id
        .unwrap();

    let added = chunks
        .add_many(vec![
            Chunk::new(&doc_id, 1, "Second.").with_embedding(vec![0.5, -0.25]),
            Chunk::new(&doc_id, 0, "First."),
        ])
        .await
        .unwrap();
    assert!(added.iter().all(|c| c.id.is_some()));

    let listed = chunks.list_by_document(&doc_id).await.unwrap();
    assert_eq!(listed.iter().map(|c| c.position).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(listed[1].embedding, Some(vec![0.5, -0.25]));
    assert_eq!(listed[0].embedding, None);

    let wanted = vec![added[0].id.clone().unwrap(), "missing".to_string()];
    let by_id = chunks.list_by_ids(&wanted).await.unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].text, "Second.");
}

#[tokio::test]
async fn test_chunk_batch_is_atomic() {
    let (_tmp, pool) = setup_pool().await;
    let documents = SqliteDocumentRepository::new(pool.clone());
    let chunks = SqliteChunkRepository::new(pool);
    let doc_id = documents
        .add(Document::new("Lease", "lease.txt"))
        .await
        .unwrap()
        .id
        .unwrap();

    let err = chunks
        .add_many(vec![
            Chunk::new(&doc_id, 0, "One."),
            Chunk::new(&doc_id, 0, "Duplicate position."),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Input(_)));
    assert!(chunks.list_by_document(&doc_id).await.unwrap().is_empty());

    let err = chunks
        .add_many(vec![Chunk::new("no-such-document", 0, "Orphan.")])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn test_deleting_document_cascades_to_chunks() {
    let (_tmp, pool) = setup_pool().await;
    let documents = SqliteDocumentRepository::new(pool.clone());
    let chunks = SqliteChunkRepository::new(pool);
    let doc_id = documents
        .add(Document::new("Lease", "lease.txt"))
        .await
        .unwrap()
        .id
        .unwrap();
    chunks
        .add_many(vec![Chunk::new(&doc_id, 0, "A."), Chunk::new(&doc_id, 1, "B.")])
        .await
        .unwrap();

    documents.delete(&doc_id).await.unwrap();
    assert!(chunks.list_by_document(&doc_id).await.unwrap().is_empty());
    assert_eq!(chunks.delete_by_document(&doc_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_vector_index_ties_and_upsert() {
    let (_tmp, pool) = setup_pool().await;
    let index = SqliteVectorIndex::new(pool);
    assert_eq!(index.dimension().await.unwrap(), None);

    index
        .add_vectors(
            &[vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
            &[metadata("d1"), metadata("d1"), metadata("d2")],
            &["a".into(), "b".into(), "c".into()],
        )
        .await
        .unwrap();
    assert_eq!(index.dimension().await.unwrap(), Some(2));

    let hits = index
        .similarity_search(&[1.0, 0.0], 3, &Filters::new())
        .await
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);

    index
        .add_vectors(&[vec![0.0, 1.0]], &[metadata("d1")], &["a".into()])
        .await
        .unwrap();
    assert_eq!(index.len().await.unwrap(), 3);
    let hits = index
        .similarity_search(&[1.0, 0.0], 1, &Filters::new())
        .await
        .unwrap();
    assert_eq!(hits[0].id, "b");
}

#[tokio::test]
async fn test_vector_index_filters_dims_and_delete() {
    let (_tmp, pool) = setup_pool().await;
    let index = SqliteVectorIndex::new(pool);
    index
        .add_vectors(
            &[vec![1.0, 0.0], vec![0.9, 0.1]],
            &[metadata("d1"), metadata("d2")],
            &["d1_0".into(), "d2_0".into()],
        )
        .await
        .unwrap();

    let mut filters = Filters::new();
    filters.insert("document_id".into(), Value::from("d2"));
    let hits = index.similarity_search(&[1.0, 0.0], 5, &filters).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "d2_0");

    let mut bad = Filters::new();
    bad.insert("colour".into(), Value::from("blue"));
    assert!(matches!(
        index.similarity_search(&[1.0, 0.0], 5, &bad).await,
        Err(RagError::Input(_))
    ));

    let err = index
        .add_vectors(&[vec![1.0, 0.0, 0.0]], &[metadata("d3")], &["d3_0".into()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RagError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));

    assert_eq!(
        index.delete(&["d1_0".into(), "missing".into()]).await.unwrap(),
        1
    );
    assert_eq!(index.len().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_vector_writes() {
    let (_tmp, pool) = setup_pool().await;
    let index = Arc::new(SqliteVectorIndex::new(pool));

    let mut handles = Vec::new();
    for i in 0..40 {
        let index = index.clone();
        handles.push(tokio::spawn(async move {
            let angle = i as f32 / 40.0;
            index
                .add_vectors(
                    &[vec![angle.cos(), angle.sin()]],
                    &[metadata(&format!("d{i}"))],
                    &[format!("d{i}_0")],
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(index.len().await.unwrap(), 40);
    assert_eq!(index.dimension().await.unwrap(), Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingestion_over_sqlite() {
    let (tmp, pool) = setup_pool().await;
    let config = parse_config(&format!(
        "[db]\npath = \"{}/data/lexrag.sqlite\"\n[embedding]\nprovider = \"hashed\"\ndims = 64\n",
        tmp.path().display()
    ))
    .unwrap();
    let pipeline = Arc::new(app::build_pipeline(&config, pool).unwrap());

    let mut handles = Vec::new();
    for i in 0..20 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .ingest_document(
                    &format!("Contract {i}"),
                    &format!("contract-{i}.txt"),
                    &format!("Clause {i} covers rent.\n\nClause {i} covers the deposit."),
                )
                .await
        }));
    }
    for handle in handles {
        let doc = handle.await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Complete);
    }

    let documents = pipeline.list_documents().await.unwrap();
    assert_eq!(documents.len(), 20);
    assert!(documents.iter().all(|d| d.status == DocumentStatus::Complete));

    let hits = pipeline
        .search(&SearchQuery::new("deposit").with_top_k(50))
        .await
        .unwrap();
    assert_eq!(hits.len(), 40);
}

#[tokio::test]
async fn test_pipeline_over_sqlite() {
    let (tmp, pool) = setup_pool().await;
    let config = parse_config(&format!(
        "[db]\npath = \"{}/data/lexrag.sqlite\"\n[embedding]\nprovider = \"hashed\"\ndims = 64\n",
        tmp.path().display()
    ))
    .unwrap();
    let pipeline = app::build_pipeline(&config, pool).unwrap();

    let doc = pipeline
        .ingest_document(
            "Lease",
            "lease.txt",
            "Rent is due monthly.\n\nThe deposit is refundable.\n\nPets are not allowed.",
        )
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Complete);
    let doc_id = doc.id.unwrap();

    let hits = pipeline
        .search(&SearchQuery::new("deposit refundable").with_top_k(3))
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, format!("{}_1", doc_id));

    let answer = pipeline.chat("Is the deposit refundable?").await.unwrap();
    assert_eq!(answer.citations.len(), 3);
    assert_eq!(answer.citations[0].document_id, doc_id);

    assert!(pipeline.delete_document(&doc_id).await.unwrap());
    assert!(pipeline
        .search(&SearchQuery::new("deposit"))
        .await
        .unwrap()
        .is_empty());
}
