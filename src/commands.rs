use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::agent::{DocumentAgent, Route};
use crate::arxiv::ArxivClient;
use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::{Embedder, OllamaClient};
use crate::extractor::FileExtractor;
use crate::indexer::{DocumentStatus, Indexer, IngestionReport};

type OllamaAgent = DocumentAgent<OllamaClient, OllamaClient, ArxivClient>;

/// Expand directories into the supported files they contain, keeping file arguments as given
#[inline]
pub fn collect_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    for path in paths {
        if !path.is_dir() {
            documents.push(path.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {}", path.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|candidate| candidate.is_file() && FileExtractor::supports(candidate))
            .collect();
        found.sort();

        if found.is_empty() {
            warn!("No supported documents found in {}", path.display());
        }
        documents.extend(found);
    }

    Ok(documents)
}

/// Ingest documents into the index and print a per-document summary
#[inline]
pub fn ingest_documents(
    config: &Config,
    paths: &[PathBuf],
    index_path: &Path,
    clear_existing: bool,
) -> Result<IngestionReport> {
    let documents = collect_documents(paths)?;
    if documents.is_empty() {
        println!("No documents to ingest.");
        println!("Supported formats: .pdf, .txt, .md");
        return Ok(IngestionReport {
            documents: Vec::new(),
            total_records: 0,
            index_path: index_path.to_path_buf(),
        });
    }

    let client =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    if let Err(e) = client.health_check() {
        warn!("Ollama health check failed: {:#}", e);
        eprintln!(
            "{} {}",
            style("⚠ Ollama is not ready:").yellow(),
            style(format!("{:#}", e)).dim()
        );
    }

    if clear_existing {
        info!("Clearing existing index at {}", index_path.display());
    }

    let report = Indexer::new(client, FileExtractor::new(), config)
        .with_progress(true)
        .ingest(&documents, index_path, clear_existing)?;

    println!("📥 Ingestion Summary");
    println!("{}", "=".repeat(50));
    for outcome in &report.documents {
        match &outcome.status {
            DocumentStatus::Ingested { pages, chunks } => println!(
                "   {} {} ({} chunks, {} pages)",
                style("✓").green(),
                outcome.source,
                chunks,
                pages
            ),
            DocumentStatus::Failed { reason } => println!(
                "   {} {} - {}",
                style("✗").red(),
                outcome.source,
                style(reason).red()
            ),
        }
    }
    println!();
    println!(
        "Successfully ingested {} of {} documents ({} new chunks)",
        report.succeeded().count(),
        report.documents.len(),
        report.chunks_added()
    );
    println!(
        "Index: {} ({} records)",
        style(report.index_path.display()).cyan(),
        report.total_records
    );

    Ok(report)
}

fn build_agent(config: &Config, index_path: &Path) -> Result<OllamaAgent> {
    let store = VectorStore::load(index_path)
        .with_context(|| format!("Failed to load index from {}", index_path.display()))?;

    if store.is_empty() {
        eprintln!(
            "{}",
            style("No documents have been ingested yet; answers will use general knowledge.")
                .yellow()
        );
    }

    let client =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    let papers = ArxivClient::new(&config.arxiv).context("Failed to initialize arXiv client")?;

    Ok(DocumentAgent::new(
        store,
        client.clone(),
        client,
        papers,
        config,
    ))
}

fn print_answer(route: Route, answer: &str) {
    if route == Route::PaperSearch {
        eprintln!("{}", style("🔎 Searched arXiv").dim());
    }
    println!("{}", answer);
}

/// Answer a single question
#[inline]
pub fn ask_question(config: &Config, index_path: &Path, question: &str) -> Result<()> {
    let mut agent = build_agent(config, index_path)?;
    let response = agent.ask(question);
    print_answer(response.route, &response.answer);
    Ok(())
}

/// Interactive session that keeps conversation history until the user leaves
#[inline]
pub fn run_chat(config: &Config, index_path: &Path) -> Result<()> {
    let mut agent = build_agent(config, index_path)?;

    eprintln!("{}", style("💬 Document Q&A").bold().cyan());
    eprintln!(
        "Index: {} ({} records)",
        style(index_path.display()).dim(),
        agent.store().len()
    );
    eprintln!(
        "{}",
        style("Type 'exit' or an empty line to quit, '/clear' to forget the conversation.").dim()
    );
    eprintln!();

    loop {
        let input: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let question = input.trim();

        match question {
            "" | "exit" | "quit" => break,
            "/clear" => {
                agent.clear_history();
                eprintln!("{}", style("Conversation cleared.").dim());
                continue;
            }
            _ => {}
        }

        let response = agent.ask(question);
        eprintln!();
        print_answer(response.route, &response.answer);
        eprintln!();
    }

    info!(
        "Chat session ended after {} messages",
        agent.history().len()
    );
    Ok(())
}

/// Print raw retrieval hits with their scores
#[inline]
pub fn search_index(config: &Config, index_path: &Path, query: &str, k: usize) -> Result<()> {
    let store = VectorStore::load(index_path)
        .with_context(|| format!("Failed to load index from {}", index_path.display()))?;

    if store.is_empty() {
        println!("The index is empty.");
        println!("Use 'doc-qa ingest <paths>' to add documents.");
        return Ok(());
    }

    let client =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    let Some(query_vector) = client.embed_query(query) else {
        anyhow::bail!("Could not embed the query; is Ollama running?");
    };

    let results = store.search(&query_vector, k)?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{} {} {}",
            style(format!("#{}", rank + 1)).bold(),
            style(result.metadata.citation()).cyan(),
            style(format!("(score {:.4})", result.score)).dim()
        );
        println!("{}", result.text);
        println!();
    }

    Ok(())
}

/// Show index statistics and Ollama connectivity
#[inline]
pub fn show_status(config: &Config, index_path: &Path) -> Result<()> {
    println!("📊 Doc QA Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.with_retry_attempts(1).health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   📋 Generation Model: {}", config.ollama.generation_model);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Invalid configuration - {:#}", e);
        }
    }

    println!();
    println!("🔍 Index Status:");
    println!("   📁 Path: {}", index_path.display());

    let store = match VectorStore::load(index_path) {
        Ok(store) => store,
        Err(e) => {
            println!("   ❌ Failed to load: {}", e);
            return Ok(());
        }
    };

    if store.is_empty() {
        println!("   💤 Empty - no documents ingested yet");
        return Ok(());
    }

    println!("   📦 Records: {}", store.len());
    if let Some(dimension) = store.dimension() {
        println!("   🔢 Dimension: {}", dimension);
    }

    let sources = store.source_counts();
    println!();
    println!("📚 Documents ({} total):", sources.len());
    for (source, summary) in &sources {
        let pages = if summary.pages.is_empty() {
            String::new()
        } else {
            format!(", {} pages", summary.pages.len())
        };
        let ingested = summary
            .last_ingested
            .map(|at| format!(", ingested {}", at.format("%Y-%m-%d %H:%M UTC")))
            .unwrap_or_default();
        println!(
            "   • {} ({} chunks{}{})",
            style(source).cyan(),
            summary.chunks,
            pages,
            ingested
        );
    }

    Ok(())
}
