use futures::future::join_all;
use mongo_scanner::driver::MemoryDriver;
use mongo_scanner::{ConnectionState, ScanOptions, Scanner};
use std::sync::Arc;
use std::time::Duration;

fn cluster() -> MemoryDriver {
    MemoryDriver::new()
        .with_database("admin", ["system.version"])
        .with_database("animals", ["cats", "dogs"])
        .with_database("fruits", ["apples", "bananas"])
        .with_database("vegetables", ["carrots"])
        .with_latency(Duration::from_millis(2))
}

fn assert_settled(scanner: &Scanner<MemoryDriver>) {
    let status = scanner.connection_status();
    let driver = scanner.driver();
    assert_eq!(status.state, ConnectionState::Closed);
    assert_eq!(status.borrowers, 0);
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.double_closes(), 0);
    assert_eq!(driver.stale_handle_uses(), 0);
    assert_eq!(driver.opens(), driver.closes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ephemeral_calls_each_close_their_handle() {
    let scanner = Arc::new(Scanner::new(cluster()));

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move {
                match i % 3 {
                    0 => scanner.list_databases(None).await.map(|_| ()),
                    1 => scanner.list_collections("animals", None).await.map(|_| ()),
                    _ => scanner.get_schema(None).await.map(|_| ()),
                }
            })
        })
        .collect();

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_settled(&scanner);
    assert_eq!(scanner.driver().opens(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_persistent_calls_share_one_handle() {
    let scanner = Arc::new(Scanner::new(cluster()));
    scanner.start_connection().await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move { scanner.get_schema(None).await })
        })
        .collect();

    for result in join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap().len(), 4);
    }

    let status = scanner.connection_status();
    assert_eq!(status.state, ConnectionState::Open);
    assert_eq!(status.borrowers, 0);
    assert_eq!(scanner.driver().opens(), 1);

    scanner.end_connection().await.unwrap();
    assert_settled(&scanner);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_persistent_toggling_during_scans() {
    let scanner = Arc::new(Scanner::new(cluster()));

    let scans: Vec<_> = (0..30)
        .map(|i| {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move {
                let options = ScanOptions::new().exclude_system(i % 2 == 0);
                scanner.get_schema(options).await
            })
        })
        .collect();

    let toggler = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move {
            for _ in 0..15 {
                scanner.start_connection().await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                scanner.end_connection().await.unwrap();
            }
        })
    };

    for result in join_all(scans).await {
        result.unwrap().unwrap();
    }
    toggler.await.unwrap();

    assert!(!scanner.is_connected());
    assert_settled(&scanner);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_and_end_never_double_close() {
    let scanner = Arc::new(Scanner::new(cluster()));

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    scanner.start_connection().await
                } else {
                    scanner.end_connection().await
                }
            })
        })
        .collect();

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }
    scanner.end_connection().await.unwrap();

    assert_settled(&scanner);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_persistent_borrows_are_all_released() {
    let scanner = Arc::new(Scanner::new(cluster()));
    scanner.start_connection().await.unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move { scanner.list_databases(None).await })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(scanner.connection_status().borrowers, 0);
    scanner.end_connection().await.unwrap();
    assert_settled(&scanner);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_start_does_not_block_ephemeral_scans() {
    let scanner = Arc::new(Scanner::new(cluster()));
    scanner.driver().hold_next_open();

    let start = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move { scanner.start_connection().await })
    };
    while scanner.driver().held_opens() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let databases = tokio::time::timeout(Duration::from_secs(5), scanner.list_databases(None))
        .await
        .expect("ephemeral scan waited on the persistent open")
        .unwrap();
    assert_eq!(databases.len(), 4);
    assert!(!scanner.is_connected());

    scanner.driver().release_held_open();
    start.await.unwrap().unwrap();
    assert!(scanner.is_connected());

    scanner.end_connection().await.unwrap();
    assert_settled(&scanner);
}
