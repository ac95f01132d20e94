use mongo_scanner::connection::{ConnectionManager, ConnectionParams};
use mongo_scanner::driver::{ConnectionOptions, DatabaseDriver, MemoryDriver, DEFAULT_URI};
use mongo_scanner::{ConnectionState, Scanner, ScannerError};
use std::sync::Arc;
use std::time::Duration;

const OTHER_URI: &str = "mongodb://replica:27018";

fn cluster() -> MemoryDriver {
    MemoryDriver::new().with_database("animals", ["cats", "dogs"])
}

#[tokio::test]
async fn test_set_connection_updates_parameters_without_opening() {
    let scanner = Scanner::new(cluster());

    scanner
        .set_connection(
            Some(OTHER_URI),
            Some(ConnectionOptions::new().with_direct_connection(true)),
        )
        .await
        .unwrap();

    assert_eq!(scanner.uri(), OTHER_URI);
    assert_eq!(scanner.connection_options().direct_connection, Some(true));
    assert_eq!(scanner.driver().opens(), 0);
}

#[tokio::test]
async fn test_later_calls_use_new_parameters() {
    let scanner = Scanner::new(cluster());
    scanner.set_connection(Some(OTHER_URI), None).await.unwrap();

    scanner.list_databases(None).await.unwrap();
    scanner.driver().refuse_uri(OTHER_URI);

    let err = scanner.list_databases(None).await.unwrap_err();
    assert_eq!(err.uri(), Some(OTHER_URI));
}

#[tokio::test]
async fn test_set_connection_reopens_persistent_connection() {
    let driver = Arc::new(cluster());
    let manager = ConnectionManager::new(Arc::clone(&driver), ConnectionParams::default());
    manager.start_persistent().await.unwrap();

    manager
        .reconfigure(ConnectionParams::new(OTHER_URI, ConnectionOptions::default()))
        .await
        .unwrap();

    let status = manager.status();
    assert_eq!(status.state, ConnectionState::Open);
    assert!(status.persistent);
    assert_eq!(driver.opens(), 2);
    assert_eq!(driver.closes(), 1);
    assert_eq!(driver.open_handles(), 1);

    let lease = manager.borrow(None).await.unwrap();
    assert_eq!(lease.handle().uri(), OTHER_URI);
    manager.release(lease).await.unwrap();

    manager.end_persistent().await.unwrap();
    assert_eq!(driver.open_handles(), 0);
}

#[tokio::test]
async fn test_set_connection_waits_for_borrowers_of_old_handle() {
    let scanner = Arc::new(Scanner::new(
        cluster().with_latency(Duration::from_millis(20)),
    ));
    scanner.start_connection().await.unwrap();

    let scan = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move { scanner.get_schema(None).await })
    };
    while scanner.connection_status().borrowers == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    scanner.set_connection(Some(OTHER_URI), None).await.unwrap();

    // The scan finished on the old handle before the new one was opened.
    let schema = scan.await.unwrap().unwrap();
    assert_eq!(schema["animals"], vec!["cats", "dogs"]);

    assert!(scanner.is_connected());
    assert_eq!(scanner.uri(), OTHER_URI);
    let driver = scanner.driver();
    assert_eq!(driver.opens(), 2);
    assert_eq!(driver.closes(), 1);
    assert_eq!(driver.stale_handle_uses(), 0);

    scanner.end_connection().await.unwrap();
    assert_eq!(scanner.driver().open_handles(), 0);
}

#[tokio::test]
async fn test_restart_after_set_connection_opens_new_handle_while_old_drains() {
    let scanner = Arc::new(Scanner::new(
        cluster().with_latency(Duration::from_millis(20)),
    ));
    scanner.start_connection().await.unwrap();

    let scan = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move { scanner.get_schema(None).await })
    };
    while scanner.connection_status().borrowers == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    scanner.end_connection().await.unwrap();
    scanner.set_connection(Some(OTHER_URI), None).await.unwrap();
    scanner.start_connection().await.unwrap();

    // The draining handle was opened with the old URI and is not reused.
    assert_eq!(scanner.driver().opens(), 2);
    assert!(scanner.is_connected());

    let schema = scan.await.unwrap().unwrap();
    assert_eq!(schema["animals"], vec!["cats", "dogs"]);

    let driver = scanner.driver();
    assert_eq!(driver.closes(), 1);
    assert_eq!(driver.open_handles(), 1);
    assert_eq!(driver.stale_handle_uses(), 0);

    scanner.driver().refuse_uri(DEFAULT_URI);
    scanner.list_databases(None).await.unwrap();

    scanner.end_connection().await.unwrap();
    assert_eq!(scanner.driver().open_handles(), 0);
    assert_eq!(scanner.driver().double_closes(), 0);
}

#[tokio::test]
async fn test_failed_reopen_leaves_slot_closed() {
    let scanner = Scanner::new(cluster());
    scanner.driver().refuse_uri(OTHER_URI);
    scanner.start_connection().await.unwrap();

    let err = scanner.set_connection(Some(OTHER_URI), None).await.unwrap_err();

    assert!(matches!(err, ScannerError::Connection { .. }));
    let status = scanner.connection_status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert!(!status.persistent);
    assert_eq!(scanner.driver().open_handles(), 0);
}

#[tokio::test]
async fn test_none_restores_defaults() {
    let scanner = Scanner::builder(cluster())
        .uri(OTHER_URI)
        .connection_options(ConnectionOptions::new().with_app_name("audit"))
        .build();

    scanner.set_connection(None, None).await.unwrap();

    assert_eq!(scanner.uri(), DEFAULT_URI);
    assert_eq!(scanner.connection_options(), ConnectionOptions::default());
}

#[tokio::test]
async fn test_handle_opened_with_new_options() {
    let driver = Arc::new(cluster());
    let options = ConnectionOptions::new()
        .with_app_name("scanner")
        .with_connect_timeout(Duration::from_secs(3));
    let manager = ConnectionManager::new(
        Arc::clone(&driver),
        ConnectionParams::new(DEFAULT_URI, options.clone()),
    );

    let lease = manager.borrow(None).await.unwrap();
    assert_eq!(lease.handle().options(), &options);
    assert!(driver.list_database_names(lease.handle()).await.is_ok());
    manager.release(lease).await.unwrap();

    assert_eq!(driver.open_handles(), 0);
}
