use mongo_scanner::driver::{ConnectionOptions, DriverError, MemoryDriver};
use mongo_scanner::{ConnectionState, ScanOptions, Scanner, ScannerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BAD_URI: &str = "mongodb://mona:1234";

fn refusing_scanner() -> Scanner<MemoryDriver> {
    let driver = MemoryDriver::new().with_database("animals", ["cats"]);
    driver.refuse_uri(BAD_URI);
    Scanner::builder(driver)
        .uri(BAD_URI)
        .connection_options(ConnectionOptions::new().with_app_name("audit"))
        .build()
}

#[tokio::test]
async fn test_failed_start_leaves_slot_closed() {
    let scanner = refusing_scanner();

    let err = scanner.start_connection().await.unwrap_err();

    assert!(matches!(err, ScannerError::Connection { .. }));
    let status = scanner.connection_status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert!(!status.persistent);
    assert!(!scanner.is_connected());
}

#[tokio::test]
async fn test_connection_error_carries_uri_and_options() {
    let scanner = refusing_scanner();

    let err = scanner.list_databases(None).await.unwrap_err();

    match err {
        ScannerError::Connection {
            uri,
            options,
            source,
        } => {
            assert_eq!(uri, BAD_URI);
            assert_eq!(options.app_name.as_deref(), Some("audit"));
            assert!(matches!(source, DriverError::ConnectionRefused(_)));
        }
        other => panic!("expected a connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_error_ignores_lack_of_permissions_option() {
    let scanner = refusing_scanner();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let options = ScanOptions::new()
        .ignore_lack_of_permissions(true)
        .on_lack_of_permissions(move |_database, _error| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let err = scanner.get_schema(options).await.unwrap_err();

    assert!(err.is_connection());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connection_error_is_not_retried() {
    let scanner = refusing_scanner();

    assert!(scanner.list_collections("animals", None).await.is_err());

    let driver = scanner.driver();
    assert_eq!(driver.opens(), 0);
    assert_eq!(driver.driver_calls(), 0);
}

#[tokio::test]
async fn test_failed_close_on_end_still_clears_the_slot() {
    let scanner = Scanner::new(MemoryDriver::new());
    scanner.start_connection().await.unwrap();
    scanner.driver().fail_close(true);

    let err = scanner.end_connection().await.unwrap_err();

    assert!(matches!(err, ScannerError::Disconnection { .. }));
    assert_eq!(err.uri(), Some("mongodb://localhost:27017"));
    let status = scanner.connection_status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert!(!status.persistent);

    // A second end has nothing left to close.
    scanner.driver().fail_close(false);
    scanner.end_connection().await.unwrap();
    assert_eq!(scanner.driver().double_closes(), 0);
}

#[tokio::test]
async fn test_recovery_after_refused_uri_is_switched() {
    let scanner = refusing_scanner();
    assert!(scanner.start_connection().await.is_err());

    scanner
        .set_connection(Some("mongodb://localhost:27017"), None)
        .await
        .unwrap();
    scanner.start_connection().await.unwrap();

    assert!(scanner.is_connected());
    assert_eq!(scanner.list_databases(None).await.unwrap(), vec!["animals"]);
    scanner.end_connection().await.unwrap();
}
