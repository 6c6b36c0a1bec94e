//! Integration tests for `KeellsFetcher`: the guest-login session exchange
//! and page-count-driven pagination, against a `wiremock` server.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pantrydb_fetch::{FetchError, FetchParams, KeellsFetcher, SourceFetcher};

fn test_fetcher(base_url: &str) -> KeellsFetcher {
    KeellsFetcher::with_base_url(5, "pantrydb-test/0.1", base_url)
        .expect("failed to build test KeellsFetcher")
}

fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(&json!({"result": {"userSessionID": "sess-1"}}))
        .insert_header("Set-Cookie", "ASP.NET_SessionId=abc123; Path=/; HttpOnly")
        .append_header("Set-Cookie", "lb=node-7; Path=/")
}

fn items_page(names: &[&str], page_count: u32) -> serde_json::Value {
    json!({
        "result": {
            "itemDetailResult": {
                "itemDetails": names.iter().map(|n| json!({
                    "itemID": 1,
                    "name": n,
                    "uom": "EA",
                    "amount": 100.0,
                })).collect::<Vec<_>>(),
                "pageCount": page_count,
            }
        }
    })
}

#[tokio::test]
async fn logs_in_once_and_reuses_the_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.0/Login/GuestLogin"))
        .respond_with(login_ok())
        .expect(1)
        .mount(&server)
        .await;

    // Listing requests must carry the session token and the login cookies.
    Mock::given(method("GET"))
        .and(path("/2.0/WebV2/GetItemDetails"))
        .and(header("usersessionid", "sess-1"))
        .and(header("Cookie", "ASP.NET_SessionId=abc123; lb=node-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&items_page(&["Rice"], 1)))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(&server.uri());
    let params = FetchParams::default();

    let first = fetcher.fetch(&params).await.expect("first fetch failed");
    let second = fetcher.fetch(&params).await.expect("second fetch failed");

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    // Mock expectations verify the login endpoint was hit exactly once.
}

#[tokio::test]
async fn follows_the_reported_page_count() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.0/Login/GuestLogin"))
        .respond_with(login_ok())
        .mount(&server)
        .await;

    for (page, names) in [(1, vec!["a", "b"]), (2, vec!["c"]), (3, vec!["d"])] {
        Mock::given(method("GET"))
            .and(path("/2.0/WebV2/GetItemDetails"))
            .and(query_param("pageNo", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(&items_page(&names, 3)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let fetcher = test_fetcher(&server.uri());
    let items = fetcher.fetch(&FetchParams::default()).await.expect("fetch failed");

    assert_eq!(items.len(), 4, "all three pages concatenated in order");
    assert_eq!(items[0]["name"], "a");
    assert_eq!(items[3]["name"], "d");
}

#[tokio::test]
async fn login_failure_is_a_hard_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.0/Login/GuestLogin"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = test_fetcher(&server.uri());
    let result = fetcher.fetch(&FetchParams::default()).await;

    assert!(
        matches!(result, Err(FetchError::Login { .. })),
        "expected Login error, got: {result:?}"
    );
}

#[tokio::test]
async fn login_without_session_id_is_a_hard_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.0/Login/GuestLogin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&json!({"result": {}}))
                .insert_header("Set-Cookie", "ASP.NET_SessionId=abc123; Path=/"),
        )
        .mount(&server)
        .await;

    let fetcher = test_fetcher(&server.uri());
    let result = fetcher.fetch(&FetchParams::default()).await;

    assert!(
        matches!(result, Err(FetchError::Login { .. })),
        "expected Login error, got: {result:?}"
    );
}

#[tokio::test]
async fn search_term_is_forwarded_to_the_listing_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.0/Login/GuestLogin"))
        .respond_with(login_ok())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2.0/WebV2/GetItemDetails"))
        .and(query_param("itemDescription", "sugar"))
        .and(query_param("outletCode", "SCDR"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&items_page(&["Sugar 1kg"], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(&server.uri());
    let params = FetchParams {
        search_term: Some("sugar".to_owned()),
        ..FetchParams::default()
    };
    let items = fetcher.fetch(&params).await.expect("fetch failed");

    assert_eq!(items.len(), 1);
}
