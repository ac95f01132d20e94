use mongo_scanner::driver::MemoryDriver;
use mongo_scanner::scanner::MAX_CONCURRENT_LISTINGS;
use mongo_scanner::{ScanOptions, Scanner, ScannerError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn cluster() -> MemoryDriver {
    MemoryDriver::new()
        .with_database("admin", ["system.version"])
        .with_database("animals", ["cats", "dogs"])
        .with_database("fruits", ["apples", "bananas"])
        .with_database("empty", ["empty"])
        .with_database("bare", Vec::<String>::new())
}

#[tokio::test]
async fn test_schema_maps_every_database() {
    let scanner = Scanner::new(cluster());

    let schema = scanner.get_schema(None).await.unwrap();

    assert_eq!(schema.len(), 5);
    assert_eq!(schema["animals"], vec!["cats", "dogs"]);
    assert_eq!(schema["admin"], vec!["system.version"]);
    assert!(schema["bare"].is_empty());
}

#[tokio::test]
async fn test_empty_databases_dropped_after_collection_filtering() {
    let scanner = Scanner::new(cluster());

    let schema = scanner
        .get_schema(
            ScanOptions::new()
                .exclude_empty_databases(true)
                .exclude_collections("empty"),
        )
        .await
        .unwrap();

    assert!(!schema.contains_key("empty"));
    assert!(!schema.contains_key("bare"));
    assert!(schema.contains_key("admin"));
    assert_eq!(schema.len(), 3);
}

#[tokio::test]
async fn test_system_only_database_dropped_when_system_excluded() {
    let scanner = Scanner::new(cluster());

    let schema = scanner
        .get_schema(
            ScanOptions::new()
                .exclude_system(true)
                .exclude_empty_databases(true),
        )
        .await
        .unwrap();

    assert!(!schema.contains_key("admin"));
    assert_eq!(schema["fruits"], vec!["apples", "bananas"]);
}

#[tokio::test]
async fn test_database_exclusions_apply_to_schema() {
    let scanner = Scanner::new(cluster());

    let schema = scanner
        .get_schema(ScanOptions::new().exclude_databases(["admin", "bare"]))
        .await
        .unwrap();

    assert_eq!(
        schema.keys().collect::<Vec<_>>(),
        vec!["animals", "empty", "fruits"]
    );
}

#[tokio::test]
async fn test_schema_opens_exactly_one_connection() {
    let scanner = Scanner::new(cluster().with_latency(Duration::from_millis(2)));

    scanner.get_schema(None).await.unwrap();

    let driver = scanner.driver();
    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
    assert_eq!(driver.list_database_calls(), 1);
    assert_eq!(driver.list_collection_calls(), 5);
    assert_eq!(driver.stale_handle_uses(), 0);
}

#[tokio::test]
async fn test_schema_in_persistent_mode_reuses_shared_connection() {
    let scanner = Scanner::new(cluster());
    scanner.start_connection().await.unwrap();

    scanner.get_schema(None).await.unwrap();
    scanner.get_schema(None).await.unwrap();

    assert_eq!(scanner.driver().opens(), 1);
    assert_eq!(scanner.connection_status().borrowers, 0);

    scanner.end_connection().await.unwrap();
    assert_eq!(scanner.driver().open_handles(), 0);
}

#[tokio::test]
async fn test_collection_error_fails_schema_by_default() {
    let scanner = Scanner::new(cluster());
    scanner.driver().deny_list_collections("fruits");

    let err = scanner.get_schema(None).await.unwrap_err();

    assert!(matches!(err, ScannerError::ListCollections { .. }));
    assert_eq!(err.database(), Some("fruits"));
    assert_eq!(scanner.driver().open_handles(), 0);
}

#[tokio::test]
async fn test_ignored_collection_error_leaves_database_empty() {
    let scanner = Scanner::new(cluster());
    scanner.driver().deny_list_collections("fruits");

    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let recorder = Arc::clone(&seen);
    let options = ScanOptions::new()
        .ignore_lack_of_permissions(true)
        .on_lack_of_permissions(move |database, _error| {
            recorder.lock().unwrap().push(database.map(str::to_string));
        });

    let schema = scanner.get_schema(options).await.unwrap();

    assert!(schema["fruits"].is_empty());
    assert_eq!(schema["animals"], vec!["cats", "dogs"]);
    assert_eq!(*seen.lock().unwrap(), vec![Some("fruits".to_string())]);
}

#[tokio::test]
async fn test_ignored_database_error_yields_empty_schema() {
    let scanner = Scanner::new(cluster());
    scanner.driver().deny_list_databases(true);

    let schema = scanner
        .get_schema(ScanOptions::new().ignore_lack_of_permissions(true))
        .await
        .unwrap();

    assert!(schema.is_empty());
    assert_eq!(scanner.driver().list_collection_calls(), 0);
    assert_eq!(scanner.driver().open_handles(), 0);
}

#[tokio::test]
async fn test_collection_listings_run_with_bounded_concurrency() {
    let driver = MemoryDriver::new().with_latency(Duration::from_millis(5));
    for i in 0..20 {
        driver.insert_database(format!("db{i:02}"), ["items"]);
    }
    let scanner = Scanner::new(driver);

    let schema = scanner.get_schema(None).await.unwrap();
    assert_eq!(schema.len(), 20);
    assert_eq!(schema["db07"], vec!["items"]);

    let peak = scanner.driver().peak_concurrent_listings();
    assert!(peak > 1, "listings ran one at a time");
    assert!(peak <= MAX_CONCURRENT_LISTINGS, "{peak} listings in flight at once");
    assert_eq!(scanner.driver().list_collection_calls(), 20);
}
