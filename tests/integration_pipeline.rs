#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingestion and question answering with deterministic collaborators

use doc_qa::agent::{DocumentAgent, Generator, Route};
use doc_qa::arxiv::{Paper, PaperSearch};
use doc_qa::config::Config;
use doc_qa::database::{VectorStore, VectorStoreError};
use doc_qa::embeddings::{Embedder, EmbeddingPurpose};
use doc_qa::extractor::FileExtractor;
use doc_qa::indexer::Indexer;
use std::cell::RefCell;
use std::fs;
use tempfile::TempDir;

const DIMENSION: usize = 256;

/// Hashed bag-of-words embedding, enough for keyword-level similarity
struct BagOfWords;

impl Embedder for BagOfWords {
    fn embed_batch(&self, texts: &[String], _purpose: EmbeddingPurpose) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; DIMENSION];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|word| word.len() > 3)
                {
                    let bucket = word
                        .to_lowercase()
                        .bytes()
                        .fold(7usize, |hash, byte| hash.wrapping_mul(31).wrapping_add(byte.into()));
                    vector[bucket % DIMENSION] += 1.0;
                }
                vector
            })
            .collect()
    }
}

#[derive(Default)]
struct EchoGenerator {
    prompts: RefCell<Vec<String>>,
}

impl Generator for EchoGenerator {
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok("generated answer".to_string())
    }
}

struct NoPapers;

impl PaperSearch for NoPapers {
    fn search(&self, _query: &str, _max_results: usize) -> anyhow::Result<Vec<Paper>> {
        Ok(Vec::new())
    }
}

fn write_corpus(temp_dir: &TempDir) -> Vec<std::path::PathBuf> {
    let biology = temp_dir.path().join("biology.txt");
    let astronomy = temp_dir.path().join("astronomy.md");
    fs::write(
        &biology,
        "Photosynthesis converts sunlight into chemical energy.\x0c\
         Chlorophyll absorbs light strongly in the blue and red wavelengths.",
    )
    .expect("should write file");
    fs::write(
        &astronomy,
        "# Stars\n\nNeutron stars are the collapsed cores of massive stars.",
    )
    .expect("should write file");
    vec![biology, astronomy]
}

#[test]
fn ingested_documents_answer_questions_with_citations() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let documents = write_corpus(&temp_dir);
    let index_path = temp_dir.path().join("data").join("vector_store.json");
    let config = Config::default();

    let report = Indexer::new(BagOfWords, FileExtractor::new(), &config)
        .ingest(&documents, &index_path, true)
        .expect("ingestion should succeed");
    assert_eq!(report.succeeded().count(), 2);
    assert_eq!(report.total_records, 3);

    let store = VectorStore::load(&index_path).expect("index should load");
    let generator = EchoGenerator::default();
    let mut agent = DocumentAgent::new(store, BagOfWords, &generator, NoPapers, &config);

    let response = agent.ask("How does chlorophyll absorb light?");
    assert_eq!(response.route, Route::LocalRetrieval);
    assert_eq!(response.answer, "generated answer");

    let prompt = generator.prompts.borrow().last().cloned().unwrap_or_default();
    let context = prompt
        .split("CONTEXT:\n")
        .nth(1)
        .expect("prompt should contain context");
    assert!(
        context.starts_with("--- SOURCE: biology.txt (page 2) ---"),
        "best hit should be the chlorophyll page: {}",
        context
    );
    assert_eq!(agent.history().len(), 2);
}

#[test]
fn persisted_index_gives_identical_search_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let documents = write_corpus(&temp_dir);
    let index_path = temp_dir.path().join("vector_store.json");
    let config = Config::default();
    let indexer = Indexer::new(BagOfWords, FileExtractor::new(), &config);

    let mut in_memory = VectorStore::new();
    indexer.ingest_into(&mut in_memory, &documents);
    in_memory.save(&index_path).expect("should save");
    let reloaded = VectorStore::load(&index_path).expect("should load");

    let query = BagOfWords
        .embed_query("neutron stars")
        .expect("query should embed");
    assert_eq!(
        in_memory.search(&query, 3).expect("search"),
        reloaded.search(&query, 3).expect("search")
    );
}

#[test]
fn mismatched_add_leaves_index_unchanged() {
    let mut store = VectorStore::new();
    let result = store.add(
        vec!["one".to_string(), "two".to_string(), "three".to_string()],
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        None,
    );

    assert!(matches!(result, Err(VectorStoreError::LengthMismatch { .. })));
    assert!(store.is_empty());
}

#[test]
fn missing_index_starts_empty_and_falls_back() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::load(&temp_dir.path().join("never-written.json"))
        .expect("missing index should load as empty");
    assert!(store.is_empty());

    let generator = EchoGenerator::default();
    let mut agent = DocumentAgent::new(store, BagOfWords, &generator, NoPapers, &Config::default());
    let response = agent.ask("What is photosynthesis?");

    assert_eq!(response.answer, "generated answer");
    let prompt = generator.prompts.borrow().last().cloned().unwrap_or_default();
    assert!(prompt.contains("no relevant local documents were found"));
}

#[test]
fn paper_questions_skip_the_index() {
    let generator = EchoGenerator::default();
    let mut agent = DocumentAgent::new(
        VectorStore::new(),
        BagOfWords,
        &generator,
        NoPapers,
        &Config::default(),
    );

    let response = agent.ask("Find papers about neutron stars");
    assert_eq!(response.route, Route::PaperSearch);

    let prompt = generator.prompts.borrow().last().cloned().unwrap_or_default();
    assert!(prompt.ends_with("CONTEXT:\nArxiv Search Results:\n"));
}
