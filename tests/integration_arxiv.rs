#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// arXiv client tests against a mock Atom endpoint

use doc_qa::arxiv::{ArxivClient, PaperSearch};
use doc_qa::config::ArxivConfig;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:retrieval augmented generation</title>
  <entry>
    <id>http://arxiv.org/abs/2005.11401v4</id>
    <title>Retrieval-Augmented Generation for Knowledge-Intensive NLP Tasks</title>
    <summary>Large pre-trained language models have been shown to store factual
knowledge in their parameters.</summary>
    <author><name>Patrick Lewis</name></author>
    <author><name>Ethan Perez</name></author>
    <link href="http://arxiv.org/abs/2005.11401v4" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2005.11401v4" rel="related" type="application/pdf"/>
  </entry>
</feed>
"#;

fn client_for(server: &MockServer) -> ArxivClient {
    ArxivClient::new(&ArxivConfig {
        base_url: format!("{}/api/query", server.uri()),
        timeout_seconds: 5,
        ..ArxivConfig::default()
    })
    .expect("should create arXiv client")
}

#[tokio::test(flavor = "multi_thread")]
async fn search_sends_relevance_query_and_parses_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("search_query", "all:retrieval augmented generation"))
        .and(query_param("max_results", "2"))
        .and(query_param("sortBy", "relevance"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/atom+xml")
                .set_body_string(FEED),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let papers = tokio::task::spawn_blocking(move || {
        client.search("retrieval augmented generation", 2)
    })
    .await
    .expect("blocking task should finish")
    .expect("search should succeed");

    assert_eq!(papers.len(), 1);
    let paper = &papers[0];
    assert_eq!(
        paper.title,
        "Retrieval-Augmented Generation for Knowledge-Intensive NLP Tasks"
    );
    assert_eq!(paper.authors, vec!["Patrick Lewis", "Ethan Perez"]);
    assert_eq!(
        paper.summary,
        "Large pre-trained language models have been shown to store factual knowledge in their parameters."
    );
    assert_eq!(paper.url, "http://arxiv.org/pdf/2005.11401v4");
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_service_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.search("anything", 3))
        .await
        .expect("blocking task should finish");

    let error = result.expect_err("503 should fail");
    assert!(error.to_string().contains("arXiv request failed"));
}
