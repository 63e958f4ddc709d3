//! End-to-end session against a real Ollama server and live web search.
//!
//! Run with: `cargo test --test e2e_ollama -- --ignored`
//!
//! # Environment Variables
//!
//! - `OLLAMA_MODEL`: model to use (default `llama3.2`)
//! - `OLLAMA_API_BASE_URL`: server URL (default `http://localhost:11434`)
//! - `SERPER_API_KEY`: optional, DuckDuckGo is used without it

use std::sync::Arc;

use research_orchestrator::{
    Config, Coordinator, DuckDuckGoSearch, HttpFetcher, MemoryStore, OllamaGenerator, QueryType,
    ResearchRequest, SearchProvider, SerperSearch,
};

#[tokio::test]
#[ignore = "Requires a running Ollama server and network access"]
async fn test_live_session() {
    let config = Config::from_env().unwrap();

    let search: Arc<dyn SearchProvider> = match &config.serper_api_key {
        Some(key) => Arc::new(SerperSearch::new(key.clone())),
        None => Arc::new(DuckDuckGoSearch::new()),
    };
    let generator = Arc::new(
        OllamaGenerator::new(
            config.model.clone(),
            config.ollama_host.clone(),
            config.temperature,
        )
        .unwrap(),
    );
    let coordinator = Coordinator::new(
        generator,
        search,
        Arc::new(HttpFetcher::new().with_timeout(config.fetch_timeout())),
        Arc::new(MemoryStore::new()),
    )
    .with_options(config.research_options());

    let session = coordinator
        .execute(ResearchRequest::new("rust async runtimes comparison"), 1, 3)
        .await
        .unwrap();

    assert_eq!(session.results.len(), 2);
    assert_eq!(session.results[0].query_type, QueryType::Primary);
    let report = session.report.unwrap();
    assert!(report.contains("## Key Findings"));
    println!("{}", report);
}
