use super::*;
use crate::extractor::ExtractedPage;
use anyhow::anyhow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

/// Serves page texts keyed by file name; unknown names fail extraction
#[derive(Default)]
struct FakeExtractor {
    documents: HashMap<String, Vec<ExtractedPage>>,
}

impl FakeExtractor {
    fn with_text(mut self, name: &str, text: &str) -> Self {
        self.documents.insert(
            name.to_string(),
            vec![ExtractedPage {
                number: None,
                text: text.to_string(),
            }],
        );
        self
    }

    fn with_pages(mut self, name: &str, pages: &[&str]) -> Self {
        self.documents.insert(
            name.to_string(),
            pages
                .iter()
                .zip(1..)
                .map(|(text, number)| ExtractedPage {
                    number: Some(number),
                    text: (*text).to_string(),
                })
                .collect(),
        );
        self
    }
}

impl TextExtractor for FakeExtractor {
    fn extract(&self, path: &Path) -> anyhow::Result<Vec<ExtractedPage>> {
        self.documents
            .get(&source_name(path))
            .cloned()
            .ok_or_else(|| anyhow!("cannot open {}", path.display()))
    }
}

/// Returns a fixed-dimension vector per text and records batch sizes
#[derive(Default)]
struct RecordingEmbedder {
    batches: RefCell<Vec<usize>>,
    purposes: RefCell<Vec<EmbeddingPurpose>>,
}

impl Embedder for RecordingEmbedder {
    fn embed_batch(&self, texts: &[String], purpose: EmbeddingPurpose) -> Vec<Vec<f32>> {
        self.batches.borrow_mut().push(texts.len());
        self.purposes.borrow_mut().push(purpose);
        texts
            .iter()
            .map(|text| {
                let dimension = if text.contains("three-dimensional") { 3 } else { 2 };
                let mut vector = vec![0.5; dimension];
                vector[0] = text.chars().count() as f32;
                vector
            })
            .collect()
    }
}

/// Drops the last vector of every batch that mentions "flaky"
struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn embed_batch(&self, texts: &[String], _purpose: EmbeddingPurpose) -> Vec<Vec<f32>> {
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|_| vec![1.0, 0.0]).collect();
        if texts.iter().any(|text| text.contains("flaky")) {
            vectors.pop();
        }
        vectors
    }
}

fn test_config() -> Config {
    Config::default()
}

fn index_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("index").join("vector_store.json")
}

fn status_of<'a>(report: &'a IngestionReport, source: &str) -> &'a DocumentStatus {
    &report
        .documents
        .iter()
        .find(|outcome| outcome.source == source)
        .expect("document should be reported")
        .status
}

#[test]
fn long_document_is_chunked_and_tagged() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let text = "w".repeat(2500);
    let extractor = FakeExtractor::default().with_text("report.txt", &text);
    let embedder = RecordingEmbedder::default();
    let indexer = Indexer::new(&embedder, extractor, &test_config());

    let report = indexer
        .ingest(&["docs/report.txt"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    let DocumentStatus::Ingested { pages, chunks } = *status_of(&report, "report.txt") else {
        panic!("report.txt should be ingested");
    };
    assert_eq!(pages, 1);
    assert!(chunks >= 3, "expected at least 3 chunks, got {}", chunks);
    assert_eq!(report.total_records, chunks);
    assert_eq!(report.chunks_added(), chunks);

    let store = VectorStore::load(&index_path(&temp_dir)).expect("index should load");
    assert_eq!(store.len(), chunks);
    assert!(store.documents().iter().all(|text| text.chars().count() <= 1000));
    assert!(
        store
            .metadatas()
            .iter()
            .all(|m| m.source.as_deref() == Some("report.txt") && m.ingested_at.is_some())
    );
    assert_eq!(
        store.documents()[0],
        "Source Document: report.txt",
        "citation header survives chunking"
    );
    assert!(
        embedder
            .purposes
            .borrow()
            .iter()
            .all(|purpose| *purpose == EmbeddingPurpose::Document)
    );
}

#[test]
fn paginated_document_keeps_page_numbers() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let extractor =
        FakeExtractor::default().with_pages("paper.pdf", &["Abstract text", "", "Conclusion"]);
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());

    let report = indexer
        .ingest(&["paper.pdf"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    assert_eq!(
        *status_of(&report, "paper.pdf"),
        DocumentStatus::Ingested {
            pages: 3,
            chunks: 2
        }
    );

    let store = VectorStore::load(&index_path(&temp_dir)).expect("index should load");
    assert_eq!(
        store.documents(),
        &[
            "Source Document: paper.pdf\nPage: 1\n\nAbstract text".to_string(),
            "Source Document: paper.pdf\nPage: 3\n\nConclusion".to_string(),
        ]
    );
    let pages: Vec<_> = store.metadatas().iter().map(|m| m.page).collect();
    assert_eq!(pages, vec![Some(1), Some(3)]);
}

#[test]
fn failing_document_does_not_stop_the_run() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let extractor = FakeExtractor::default()
        .with_text("a.txt", "alpha content")
        .with_text("c.txt", "gamma content");
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());

    let report = indexer
        .ingest(&["a.txt", "missing.txt", "c.txt"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    assert_eq!(report.documents.len(), 3);
    assert_eq!(report.succeeded().count(), 2);
    assert_eq!(report.failed().count(), 1);
    match status_of(&report, "missing.txt") {
        DocumentStatus::Failed { reason } => assert!(reason.contains("cannot open")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.total_records, 2);

    let sources: Vec<_> = VectorStore::load(&index_path(&temp_dir))
        .expect("index should load")
        .metadatas()
        .iter()
        .filter_map(|m| m.source.clone())
        .collect();
    assert_eq!(sources, vec!["a.txt", "c.txt"]);
}

#[test]
fn short_embedding_batch_fails_only_that_document() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let extractor = FakeExtractor::default()
        .with_text("good.txt", "steady content")
        .with_text("bad.txt", "flaky content");
    let indexer = Indexer::new(ShortEmbedder, extractor, &test_config());

    let report = indexer
        .ingest(&["good.txt", "bad.txt"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    match status_of(&report, "bad.txt") {
        DocumentStatus::Failed { reason } => {
            assert!(reason.contains("expected 1, received 0"), "{}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(report.documents[0].is_success());
    assert_eq!(report.total_records, 1);
}

#[test]
fn dimension_mismatch_fails_only_that_document() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let extractor = FakeExtractor::default()
        .with_text("flat.txt", "flat content")
        .with_text("deep.txt", "three-dimensional content");
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());

    let report = indexer
        .ingest(&["flat.txt", "deep.txt"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    match status_of(&report, "deep.txt") {
        DocumentStatus::Failed { reason } => assert!(reason.contains("dimension mismatch")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.total_records, 1);
}

#[test]
fn blank_document_is_reported_as_failed() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let extractor = FakeExtractor::default().with_text("blank.txt", "  \n\n  ");
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());

    let report = indexer
        .ingest(&["blank.txt"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    assert_eq!(
        *status_of(&report, "blank.txt"),
        DocumentStatus::Failed {
            reason: "No text could be extracted".to_string()
        }
    );
    assert_eq!(report.total_records, 0);
    assert!(index_path(&temp_dir).exists(), "index is persisted even when empty");
}

#[test]
fn embeddings_are_requested_in_batches() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let paragraphs: Vec<String> = (0..120).map(|i| format!("paragraph {}", i)).collect();
    let text = paragraphs.join("\n\n");
    let extractor = FakeExtractor::default().with_text("long.md", &text);
    let embedder = RecordingEmbedder::default();

    let mut config = test_config();
    config.chunking.max_chunk_size = 50;
    config.chunking.chunk_overlap = 0;
    let indexer = Indexer::new(&embedder, extractor, &config);

    let report = indexer
        .ingest(&["long.md"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    let chunks = report.chunks_added();
    let batches = embedder.batches.borrow().clone();
    assert_eq!(batches.iter().sum::<usize>(), chunks);
    assert!(batches.iter().all(|&size| size <= 50));
    assert_eq!(batches.len(), chunks.div_ceil(50));
}

#[test]
fn custom_batch_size_is_respected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let extractor = FakeExtractor::default().with_pages("p.pdf", &["one", "two", "three", "four", "five"]);
    let embedder = RecordingEmbedder::default();
    let indexer = Indexer::new(&embedder, extractor, &test_config()).with_batch_size(2);

    indexer
        .ingest(&["p.pdf"], &index_path(&temp_dir), false)
        .expect("ingestion should succeed");

    assert_eq!(*embedder.batches.borrow(), vec![2, 2, 1]);
}

#[test]
fn append_keeps_existing_records() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = index_path(&temp_dir);
    let extractor = FakeExtractor::default()
        .with_text("first.txt", "first document")
        .with_text("second.txt", "second document");
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());

    indexer
        .ingest(&["first.txt"], &path, false)
        .expect("first run should succeed");
    let report = indexer
        .ingest(&["second.txt"], &path, false)
        .expect("second run should succeed");

    assert_eq!(report.total_records, 2);
    assert_eq!(report.chunks_added(), 1);
}

#[test]
fn clear_existing_rebuilds_from_scratch() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = index_path(&temp_dir);
    let extractor = FakeExtractor::default()
        .with_text("first.txt", "first document")
        .with_text("second.txt", "second document");
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());

    indexer
        .ingest(&["first.txt"], &path, false)
        .expect("first run should succeed");
    let report = indexer
        .ingest(&["second.txt"], &path, true)
        .expect("rebuild should succeed");

    assert_eq!(report.total_records, 1);
    let store = VectorStore::load(&path).expect("index should load");
    assert_eq!(store.metadatas()[0].source.as_deref(), Some("second.txt"));
}

#[test]
fn corrupt_index_aborts_append_but_not_rebuild() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_store.json");
    fs::write(&path, "{broken").expect("should write fixture");

    let extractor = FakeExtractor::default().with_text("a.txt", "alpha");
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());

    let result = indexer.ingest(&["a.txt"], &path, false);
    assert!(matches!(result, Err(crate::QaError::VectorStore(_))));

    let report = indexer
        .ingest(&["a.txt"], &path, true)
        .expect("rebuild should replace the corrupt index");
    assert_eq!(report.total_records, 1);
}

#[test]
fn ingest_into_leaves_disk_untouched() {
    let extractor = FakeExtractor::default().with_text("a.txt", "alpha");
    let indexer = Indexer::new(RecordingEmbedder::default(), extractor, &test_config());
    let mut store = VectorStore::new();

    let outcomes = indexer.ingest_into(&mut store, &[PathBuf::from("a.txt")]);

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_success());
    assert_eq!(store.len(), 1);
}

#[test]
fn outcome_display() {
    let ingested = DocumentOutcome {
        path: PathBuf::from("docs/a.pdf"),
        source: "a.pdf".to_string(),
        status: DocumentStatus::Ingested {
            pages: 2,
            chunks: 5,
        },
    };
    assert_eq!(ingested.to_string(), "a.pdf: 5 chunks from 2 pages");

    let failed = DocumentOutcome {
        status: DocumentStatus::Failed {
            reason: "No text could be extracted".to_string(),
        },
        ..ingested
    };
    assert_eq!(failed.to_string(), "a.pdf: failed (No text could be extracted)");
}

#[test]
fn source_name_uses_file_name() {
    assert_eq!(source_name(Path::new("/tmp/docs/paper.pdf")), "paper.pdf");
    assert_eq!(source_name(Path::new("notes.md")), "notes.md");
}
