use flopt::{ErrorCode, Flags, FliptConfig, FliptFetcher, Refresher, RefresherOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Serve a single canned HTTP response and hand back the raw request.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let n = socket.read(&mut buf).await.unwrap();
        let request = String::from_utf8_lossy(&buf[..n]).to_string();

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{}", addr), handle)
}

fn fetcher_for(base_url: &str) -> FliptFetcher {
    FliptFetcher::new(FliptConfig::new(base_url, "default").timeout(Duration::from_secs(5))).unwrap()
}

mod fetch_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_enabled_flag() {
        let (base_url, server) =
            serve_once("200 OK", r#"{"key":"test-flag","enabled":true,"namespaceKey":"default"}"#)
                .await;
        let fetcher = fetcher_for(&base_url);

        let enabled = fetcher
            .fetch(&CancellationToken::new(), "test-flag")
            .await
            .unwrap();
        assert!(enabled);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/v1/namespaces/default/flags/test-flag HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_fetch_disabled_flag() {
        let (base_url, _server) = serve_once("200 OK", r#"{"key":"off","enabled":false}"#).await;
        let enabled = fetcher_for(&base_url)
            .fetch(&CancellationToken::new(), "off")
            .await
            .unwrap();
        assert!(!enabled);
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let (base_url, server) = serve_once("200 OK", r#"{"key":"k","enabled":true}"#).await;
        let config = FliptConfig::new(base_url, "default").client_token("secret-token");
        let fetcher = FliptFetcher::new(config).unwrap();

        fetcher.fetch(&CancellationToken::new(), "k").await.unwrap();

        let request = server.await.unwrap().to_lowercase();
        assert!(request.contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn test_not_found_is_an_error() {
        let (base_url, _server) = serve_once("404 Not Found", r#"{"code":5}"#).await;
        let err = fetcher_for(&base_url)
            .fetch(&CancellationToken::new(), "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FlagNotFound);
        assert!(err.message.contains("404"));
    }

    #[tokio::test]
    async fn test_null_body_is_not_found() {
        let (base_url, _server) = serve_once("200 OK", "null").await;
        let err = fetcher_for(&base_url)
            .fetch(&CancellationToken::new(), "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FlagNotFound);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let (base_url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let err = fetcher_for(&base_url)
            .fetch(&CancellationToken::new(), "k")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::HttpServerError);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let (base_url, _server) = serve_once("200 OK", "not json").await;
        let err = fetcher_for(&base_url)
            .fetch(&CancellationToken::new(), "k")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::HttpInvalidResponse);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = fetcher_for(&base_url)
            .fetch(&CancellationToken::new(), "k")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::HttpNetworkError);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_returns_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher_for(&base_url).fetch(&cancel, "k").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::FetchCancelled);
        drop(listener);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = FliptFetcher::new(FliptConfig::new("localhost:8080", "default"))
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::ConfigInvalidUrl);
    }
}

mod refresher_integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_refresher_with_flipt_fetcher() {
        let (base_url, _server) = serve_once("200 OK", r#"{"key":"test-flag","enabled":true}"#).await;
        let flags = Arc::new(Flags::empty());
        assert!(!flags.is_enabled("test-flag", false));

        let options = RefresherOptions::new(fetcher_for(&base_url).into_fetch_fn());
        let refresher = Refresher::new(Arc::clone(&flags), options).unwrap();
        let report = refresher.refresh_once(&CancellationToken::new()).await;

        assert_eq!(report.failed, 0);
        assert!(flags.is_enabled("test-flag", false));
    }
}
