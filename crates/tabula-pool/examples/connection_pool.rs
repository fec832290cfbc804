//! Connection pool metrics example.
//!
//! Drives a pool with more concurrent work than it has connections and
//! prints its status and counters along the way. Uses the scripted connector
//! from `tabula-testing`, so no server is needed.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=tabula_pool=trace cargo run -p tabula-pool --example connection_pool
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use tabula_client::Connection;
use tabula_pool::{Pool, PoolConfig};
use tabula_testing::{MockConnector, MockResponse};
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Connection Pool with Metrics Example ===\n");

    let connector = MockConnector::builder()
        .with_default_response(MockResponse::affected(1))
        .with_query_delay(Duration::from_millis(20))
        .build();

    let config = PoolConfig::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5));

    println!("Pool configuration:");
    println!("  Max connections: {}", config.max_connections);
    println!("  Acquire timeout: {:?}", config.acquire_timeout);
    println!();

    let pool = Pool::new(config, connector.clone())?;

    // Example 1: Basic pool usage
    println!("1. Basic pool usage:");
    {
        let mut conn = pool.acquire().await?;
        let outcome = conn.query("UPDATE `counters` SET `n`=`n`+1 WHERE `id`=1").await?;
        println!("  Rows affected: {}", outcome.affected_rows);
        // Dropping the guard returns the connection
    }
    print_pool_status(&pool);

    // Example 2: More tasks than connections
    println!("\n2. Concurrent pool usage (20 tasks, 4 connections):");
    let start = Instant::now();
    let mut handles = vec![];

    for i in 0..20 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut conn = pool.acquire().await?;
            conn.query(&format!("UPDATE `jobs` SET `done`=1 WHERE `id`={i}"))
                .await?;
            pool.release(conn).await;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(i)
        }));
    }

    // Watch the queue while the tasks run
    tokio::time::sleep(Duration::from_millis(30)).await;
    print_pool_status(&pool);

    let mut completed = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            completed += 1;
        }
    }
    println!("  Completed {} queries in {:?}", completed, start.elapsed());
    print_pool_metrics(&pool);

    // Example 3: A faulted connection is replaced
    println!("\n3. Fault handling:");
    let mut conn = pool.acquire().await?;
    connector.push_response(MockResponse::fault("server has gone away"));
    if let Err(e) = conn.query("SELECT 1").await {
        println!("  Query failed: {e}");
        conn.mark_broken();
    }
    pool.release(conn).await;
    print_pool_status(&pool);
    print_pool_metrics(&pool);

    // Graceful shutdown
    println!("\n4. Graceful shutdown:");
    pool.close().await;
    println!("  Pool closed, {} connections closed in total.", connector.closes());

    Ok(())
}

fn print_pool_status(pool: &Pool<MockConnector>) {
    let status = pool.status();
    println!(
        "  Status: {}/{} connections in use, {} idle, {} waiting ({:.1}% utilization)",
        status.in_use,
        status.total,
        status.available,
        status.waiting,
        status.utilization()
    );
}

fn print_pool_metrics(pool: &Pool<MockConnector>) {
    let metrics = pool.metrics();
    println!("  Metrics:");
    println!("    Connections created: {}", metrics.connections_created);
    println!("    Connections closed: {}", metrics.connections_closed);
    println!("    Checkouts: {} ({} waited)", metrics.checkouts, metrics.waits);
    println!("    Faults: {}, timeouts: {}", metrics.faults, metrics.timeouts);
}
