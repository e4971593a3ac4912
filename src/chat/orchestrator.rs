use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;

use crate::config::{RetrievalSettings, WebSettings};
use crate::core::errors::ApiError;
use crate::knowledge::KnowledgeBase;
use crate::llm::{provider_for, ChatMessage, LlmConfig, LlmProvider};
use crate::web::{search_web, PageFetcher};

/// Reply used when a turn is submitted with every retrieval source
/// disabled. No provider is contacted in that case.
pub const SOURCES_REQUIRED_MESSAGE: &str = "Please enable **Use Knowledge Base** or **Search Web** to proceed.\n\nYou also need to ensure you have added content (PDFs or Web links) for me to answer your queries.";

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub use_knowledge_base: bool,
    pub use_web_search: bool,
}

/// One fetched search hit ready for the prompt.
struct PageContext {
    title: String,
    url: String,
    snippet: String,
    content: String,
}

/// Drives one chat turn: gathers grounding context, assembles the
/// message list, and streams the provider's reply.
pub struct ChatOrchestrator {
    kb: Arc<KnowledgeBase>,
    fetcher: Arc<PageFetcher>,
    client: reqwest::Client,
    web: WebSettings,
    retrieval: RetrievalSettings,
}

impl ChatOrchestrator {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        fetcher: Arc<PageFetcher>,
        client: reqwest::Client,
        web: WebSettings,
        retrieval: RetrievalSettings,
    ) -> Self {
        Self {
            kb,
            fetcher,
            client,
            web,
            retrieval,
        }
    }

    /// Run one turn against the configured provider.
    pub async fn send_message(
        &self,
        history: Vec<ChatMessage>,
        user_text: &str,
        config: &LlmConfig,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let provider = provider_for(config.provider, &self.client);
        self.send_with_provider(provider, history, user_text, config, options)
            .await
    }

    /// Same as [`send_message`] with an explicit provider implementation.
    pub async fn send_with_provider(
        &self,
        provider: Arc<dyn LlmProvider>,
        mut history: Vec<ChatMessage>,
        user_text: &str,
        config: &LlmConfig,
        options: ChatOptions,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        history.push(ChatMessage::user(user_text));

        // Source check: with no retrieval source enabled the turn
        // short-circuits to a fixed instruction, no network involved.
        if !options.use_knowledge_base && !options.use_web_search {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.send(Ok(SOURCES_REQUIRED_MESSAGE.to_string())).await;
            return Ok(rx);
        }

        let web_context = if options.use_web_search {
            self.gather_web_context(user_text).await
        } else {
            None
        };

        let kb_context = if options.use_knowledge_base {
            let citations = self
                .kb
                .search_documents(user_text, self.retrieval.top_k)
                .await;
            if citations.is_empty() {
                None
            } else {
                Some(citations.join("\n\n---\n\n"))
            }
        } else {
            None
        };

        let messages = assemble_messages(history, user_text, kb_context, web_context);
        provider.stream_chat(messages, config).await
    }

    /// Search the web for the user's text and fetch the top result pages.
    ///
    /// Fetches fan out concurrently and fail independently; the join
    /// waits for every outcome before aggregating the successes. Returns
    /// `None` when the search itself fails or nothing was fetched.
    async fn gather_web_context(&self, query: &str) -> Option<String> {
        let results = match search_web(&self.client, query, self.web.max_search_results).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!("Web search failed: {}", err);
                return None;
            }
        };

        if results.is_empty() {
            return None;
        }
        tracing::info!("Fetching content from {} search results", results.len());

        let fetches = results.iter().map(|result| {
            let fetcher = Arc::clone(&self.fetcher);
            let budget = self.web.page_char_budget;
            async move {
                match fetcher.fetch_text(&result.url).await {
                    Ok(content) => Some(PageContext {
                        title: result.title.clone(),
                        url: result.url.clone(),
                        snippet: result.snippet.clone(),
                        content: truncate_chars(&content, budget),
                    }),
                    Err(err) => {
                        tracing::warn!("Failed to fetch URL {}: {}", result.url, err);
                        None
                    }
                }
            }
        });

        let pages: Vec<PageContext> = join_all(fetches).await.into_iter().flatten().collect();
        if pages.is_empty() {
            return None;
        }

        let blocks: Vec<String> = pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                format!(
                    "{}. **{}** - {}\n{}\n\nContent:\n{}",
                    index + 1,
                    page.title,
                    page.url,
                    page.snippet,
                    page.content
                )
            })
            .collect();

        Some(blocks.join("\n\n---\n\n"))
    }
}

/// Merge grounding context into the outgoing message list.
///
/// Knowledge-base context becomes a leading system message; web context
/// is prepended to it (web content first) rather than replacing it. The
/// prior conversation follows unchanged.
fn assemble_messages(
    history: Vec<ChatMessage>,
    user_text: &str,
    kb_context: Option<String>,
    web_context: Option<String>,
) -> Vec<ChatMessage> {
    let mut messages = history;

    if let Some(context) = kb_context {
        messages.insert(0, ChatMessage::system(kb_system_prompt(&context)));
    }

    if let Some(context) = web_context {
        let web_prompt = web_system_prompt(user_text, &context);
        match messages.first_mut() {
            Some(first) if first.role == "system" => {
                first.content = format!("{}\n\n---\n\n{}", web_prompt, first.content);
            }
            _ => messages.insert(0, ChatMessage::system(web_prompt)),
        }
    }

    messages
}

fn kb_system_prompt(context: &str) -> String {
    format!(
        r#"You are a helpful assistant with access to a knowledge base. Use the following sources to help answer the user's question.

IMPORTANT CITATION INSTRUCTIONS:
1. When using information from these sources, cite them by mentioning the source name
2. Quote the exact relevant text in double quotes when referencing specific information
3. Format citations like: According to [Source Name], "exact quoted text"
4. If information comes from a web page or PDF, mention it explicitly
5. If you use multiple sources, cite each one separately

AVAILABLE SOURCES:
{}

If the sources don't contain relevant information, you may use your general knowledge but clearly indicate when you're doing so."#,
        context
    )
}

fn web_system_prompt(query: &str, context: &str) -> String {
    format!(
        r#"You are answering based on current web search results. Use this information to provide an accurate, up-to-date answer.

Search Query: "{}"

WEB SEARCH RESULTS:
{}

Please answer the user's question using the above search results. Cite sources by mentioning the title and URL."#,
        query, context
    )
}

/// Truncate to at most `budget` characters without splitting a code
/// point.
fn truncate_chars(text: &str, budget: usize) -> String {
    text.chars().take(budget).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::chat::Conversation;
    use crate::config::WebSettings;
    use crate::embeddings::{EmbeddingProvider, EmbeddingService};
    use crate::knowledge::{DocumentCatalog, DocumentSource};
    use crate::llm::ProviderKind;
    use crate::vector_store::SqliteVectorStore;

    /// Records whether it was called and streams canned fragments.
    struct FakeProvider {
        fragments: Vec<&'static str>,
        called: AtomicBool,
        seen_messages: std::sync::Mutex<Vec<ChatMessage>>,
    }

    impl FakeProvider {
        fn new(fragments: Vec<&'static str>) -> Self {
            Self {
                fragments,
                called: AtomicBool::new(false),
                seen_messages: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn stream_chat(
            &self,
            messages: Vec<ChatMessage>,
            _config: &LlmConfig,
        ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
            self.called.store(true, Ordering::SeqCst);
            *self.seen_messages.lock().unwrap() = messages;

            let (tx, rx) = mpsc::channel(8);
            let fragments = self.fragments.clone();
            tokio::spawn(async move {
                for fragment in fragments {
                    if tx.send(Ok(fragment.to_string())).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }

        async fn list_models(&self, _config: &LlmConfig) -> Vec<String> {
            vec!["fake-model".to_string()]
        }
    }

    async fn test_orchestrator() -> ChatOrchestrator {
        let dir = std::env::temp_dir().join(format!("lorekeep-chat-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let client = reqwest::Client::new();
        let embeddings = EmbeddingService::new(EmbeddingProvider::Local, None, client.clone());
        let store = SqliteVectorStore::with_path(dir.join("vectors.db"))
            .await
            .unwrap();
        let kb = Arc::new(KnowledgeBase::new(
            embeddings,
            Arc::new(store),
            DocumentCatalog::load(dir.join("documents.json")),
            client.clone(),
        ));
        let web = WebSettings::default();
        let fetcher = Arc::new(PageFetcher::new(client.clone(), &web));

        ChatOrchestrator::new(kb, fetcher, client, web, RetrievalSettings::default())
    }

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: ProviderKind::Ollama,
            api_key: None,
            model: "llama3".to_string(),
            base_url: None,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<Result<String, ApiError>>) -> Conversation {
        let mut conversation = Conversation::new();
        conversation.begin_assistant();
        while let Some(fragment) = rx.recv().await {
            if let Ok(fragment) = fragment {
                conversation.append_fragment(&fragment);
            }
        }
        conversation
    }

    #[tokio::test]
    async fn disabled_sources_short_circuit_without_provider_call() {
        let orchestrator = test_orchestrator().await;
        let provider = Arc::new(FakeProvider::new(vec!["should not stream"]));

        let rx = orchestrator
            .send_with_provider(
                Arc::clone(&provider) as Arc<dyn LlmProvider>,
                Vec::new(),
                "any message",
                &test_config(),
                ChatOptions::default(),
            )
            .await
            .unwrap();

        let conversation = collect(rx).await;
        assert_eq!(conversation.last_assistant(), Some(SOURCES_REQUIRED_MESSAGE));
        assert!(!provider.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn streamed_fragments_accumulate_in_order() {
        let orchestrator = test_orchestrator().await;
        let provider = Arc::new(FakeProvider::new(vec!["Hel", "lo", " world"]));

        let rx = orchestrator
            .send_with_provider(
                Arc::clone(&provider) as Arc<dyn LlmProvider>,
                Vec::new(),
                "greet me",
                &test_config(),
                ChatOptions {
                    use_knowledge_base: true,
                    use_web_search: false,
                },
            )
            .await
            .unwrap();

        let conversation = collect(rx).await;
        assert_eq!(conversation.last_assistant(), Some("Hello world"));
    }

    #[tokio::test]
    async fn knowledge_base_context_becomes_leading_system_message() {
        let orchestrator = test_orchestrator().await;
        orchestrator
            .kb
            .add_document(
                "handbook.pdf",
                "Employees accrue vacation at two days per month of service.",
                DocumentSource::Pdf,
                None,
                None,
            )
            .await
            .unwrap();

        let provider = Arc::new(FakeProvider::new(vec!["ok"]));
        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];

        let rx = orchestrator
            .send_with_provider(
                Arc::clone(&provider) as Arc<dyn LlmProvider>,
                history,
                "how does vacation accrue?",
                &test_config(),
                ChatOptions {
                    use_knowledge_base: true,
                    use_web_search: false,
                },
            )
            .await
            .unwrap();
        collect(rx).await;

        let seen = provider.seen_messages.lock().unwrap().clone();
        assert_eq!(seen[0].role, "system");
        assert!(seen[0].content.contains("IMPORTANT CITATION INSTRUCTIONS"));
        assert!(seen[0].content.contains("handbook.pdf"));
        // Prior conversation preserved after the system message.
        assert_eq!(seen[1].content, "earlier question");
        assert_eq!(seen[2].content, "earlier answer");
        assert_eq!(seen[3].content, "how does vacation accrue?");
    }

    #[tokio::test]
    async fn empty_knowledge_base_sends_no_system_message() {
        let orchestrator = test_orchestrator().await;
        let provider = Arc::new(FakeProvider::new(vec!["ok"]));

        let rx = orchestrator
            .send_with_provider(
                Arc::clone(&provider) as Arc<dyn LlmProvider>,
                Vec::new(),
                "anything at all",
                &test_config(),
                ChatOptions {
                    use_knowledge_base: true,
                    use_web_search: false,
                },
            )
            .await
            .unwrap();
        collect(rx).await;

        let seen = provider.seen_messages.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].role, "user");
    }

    #[test]
    fn web_context_is_prepended_to_kb_context() {
        let history = vec![ChatMessage::user("question")];
        let messages = assemble_messages(
            history,
            "question",
            Some("KB CONTEXT".to_string()),
            Some("WEB CONTEXT".to_string()),
        );

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");

        let web_pos = messages[0].content.find("WEB CONTEXT").unwrap();
        let kb_pos = messages[0].content.find("KB CONTEXT").unwrap();
        assert!(web_pos < kb_pos);
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn web_context_alone_becomes_the_system_message() {
        let messages = assemble_messages(
            vec![ChatMessage::user("q")],
            "q",
            None,
            Some("WEB ONLY".to_string()),
        );

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("WEB ONLY"));
        assert!(messages[0].content.contains("Search Query: \"q\""));
    }

    #[test]
    fn no_context_leaves_history_untouched() {
        let history = vec![ChatMessage::user("q")];
        let messages = assemble_messages(history.clone(), "q", None, None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "déjà vu ".repeat(500);
        let truncated = truncate_chars(&text, 2000);
        assert_eq!(truncated.chars().count(), 2000);
    }
}
