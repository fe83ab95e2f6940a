// Agent module
// Routes questions to local retrieval or paper search and assembles grounded prompts


use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::arxiv::{PaperSearch, format_papers};
use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::Embedder;

const LOCAL_CONTEXT_INSTRUCTION: &str = "You are an expert research assistant. \
Use the provided Context from uploaded documents to answer the user's question. \
If the answer is found in the context, cite the source document name and page. \
If the answer is NOT in the context, say so.\n\n\
FORMATTING:\n\
- Use Markdown.\n\
- If listing facts, use bullet points.\n\
- When summarizing, keep it structured.";

const NO_CONTEXT_INSTRUCTION: &str = "You are a helpful AI assistant. \
The user is asking a question, but no relevant local documents were found. \
Answer to the best of your ability using your general knowledge, \
but mention that you don't have access to specific documents about this.";

const PAPER_SEARCH_INSTRUCTION: &str = "You are a helpful research assistant. \
The user is asking to find research papers. \
Use the provided Arxiv search results to answer the user's request. \
Cite the papers with their Titles and URLs.";

/// External text generation
pub trait Generator {
    fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

impl<T: Generator + ?Sized> Generator for &T {
    #[inline]
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        (**self).generate(prompt)
    }
}

impl<T: Generator + ?Sized> Generator for Box<T> {
    #[inline]
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        (**self).generate(prompt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    PaperSearch,
    LocalRetrieval,
}

impl fmt::Display for Route {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaperSearch => write!(f, "paper search"),
            Self::LocalRetrieval => write!(f, "local retrieval"),
        }
    }
}

/// Keyword router: a question containing any trigger phrase goes to paper search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRouter {
    triggers: Vec<String>,
}

impl QueryRouter {
    #[inline]
    pub fn new<I, S>(triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            triggers: triggers
                .into_iter()
                .map(|phrase| phrase.as_ref().trim().to_lowercase())
                .filter(|phrase| !phrase.is_empty())
                .collect(),
        }
    }

    #[inline]
    pub fn route(&self, query: &str) -> Route {
        let query = query.to_lowercase();
        if self.triggers.iter().any(|phrase| query.contains(phrase)) {
            Route::PaperSearch
        } else {
            Route::LocalRetrieval
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Session-owned conversation log. Holds at most `capacity` messages; the oldest
/// are evicted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl ConversationHistory {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(Message {
            role,
            content: content.into(),
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    #[inline]
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// The last `turns` question/answer exchanges, oldest first
    #[inline]
    pub fn recent_turns(&self, turns: usize) -> impl Iterator<Item = &Message> {
        let take = turns.saturating_mul(2).min(self.messages.len());
        self.messages.iter().skip(self.messages.len() - take)
    }

    /// `RECENT CONVERSATION:` block for prompts, `None` when there is nothing to show
    #[inline]
    pub fn render_recent(&self, turns: usize) -> Option<String> {
        let lines: Vec<String> = self
            .recent_turns(turns)
            .map(|message| format!("{}: {}", message.role, message.content))
            .collect();

        (!lines.is_empty())
            .then(|| format!("RECENT CONVERSATION:\n{}\n", lines.join("\n")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub route: Route,
    pub answer: String,
}

/// Question answering over a loaded vector index.
///
/// Every collaborator failure is converted into text so that [`DocumentAgent::ask`]
/// always produces an answer.
pub struct DocumentAgent<E, G, P> {
    store: VectorStore,
    embedder: E,
    generator: G,
    papers: P,
    router: QueryRouter,
    top_k: usize,
    history_turns: usize,
    max_papers: usize,
    history: ConversationHistory,
}

impl<E, G, P> DocumentAgent<E, G, P>
where
    E: Embedder,
    G: Generator,
    P: PaperSearch,
{
    #[inline]
    pub fn new(store: VectorStore, embedder: E, generator: G, papers: P, config: &Config) -> Self {
        Self {
            store,
            embedder,
            generator,
            papers,
            router: QueryRouter::new(&config.retrieval.paper_search_triggers),
            top_k: config.retrieval.top_k,
            history_turns: config.retrieval.history_turns,
            max_papers: config.arxiv.max_results,
            history: ConversationHistory::new(config.retrieval.history_capacity),
        }
    }

    #[inline]
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[inline]
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Swap in a freshly loaded index, e.g. after an ingestion run
    #[inline]
    pub fn replace_store(&mut self, store: VectorStore) {
        info!("Agent now serving an index of {} records", store.len());
        self.store = store;
    }

    /// Answer `question` and record the exchange in the conversation history
    #[inline]
    pub fn ask(&mut self, question: &str) -> AgentResponse {
        let route = self.router.route(question);
        debug!("Routing question via {}", route);

        let (instruction, context) = match route {
            Route::PaperSearch => {
                info!("Searching papers...");
                let results = self.search_papers(question);
                (
                    PAPER_SEARCH_INSTRUCTION,
                    format!("Arxiv Search Results:\n{}", results),
                )
            }
            Route::LocalRetrieval => {
                info!("Retrieving context...");
                let context = self.retrieve_context(question);
                if context.is_empty() {
                    (NO_CONTEXT_INSTRUCTION, context)
                } else {
                    (LOCAL_CONTEXT_INSTRUCTION, context)
                }
            }
        };

        let prompt = self.build_prompt(instruction, question, &context);

        let answer = match self.generator.generate(&prompt) {
            Ok(answer) => answer,
            Err(e) => {
                error!("Answer generation failed: {:#}", e);
                format!("Error generating answer: {}", e)
            }
        };

        self.history.push(Role::User, question);
        self.history.push(Role::Assistant, answer.clone());

        AgentResponse { route, answer }
    }

    /// Labeled blocks of the most relevant chunks, empty when nothing was found
    #[inline]
    pub fn retrieve_context(&self, query: &str) -> String {
        if self.store.is_empty() {
            debug!("Index is empty, no local context");
            return String::new();
        }

        let Some(query_vector) = self.embedder.embed_query(query) else {
            warn!("Query embedding unavailable, answering without local context");
            return String::new();
        };

        let results = match self.store.search(&query_vector, self.top_k) {
            Ok(results) => results,
            Err(e) => {
                error!("Index search failed: {}", e);
                return String::new();
            }
        };

        debug!("Retrieved {} chunks for context", results.len());

        results
            .iter()
            .map(|result| {
                format!(
                    "--- SOURCE: {} ---\n{}\n",
                    result.metadata.citation(),
                    result.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Paper search results as context text; failures become an error line
    #[inline]
    pub fn search_papers(&self, query: &str) -> String {
        match self.papers.search(query, self.max_papers) {
            Ok(papers) => format_papers(&papers),
            Err(e) => {
                warn!("Paper search failed: {:#}", e);
                format!("Error searching Arxiv: {}", e)
            }
        }
    }

    #[inline]
    pub fn build_prompt(&self, instruction: &str, question: &str, context: &str) -> String {
        let recent = self
            .history
            .render_recent(self.history_turns)
            .map(|block| format!("{}\n", block))
            .unwrap_or_default();

        format!(
            "{}\n\n{}USER QUESTION: {}\n\nCONTEXT:\n{}",
            instruction, recent, question, context
        )
    }
}
