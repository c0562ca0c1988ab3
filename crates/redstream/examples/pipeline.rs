//! Pipeline example
//!
//! Demonstrates:
//! - Writing changes with `Producer::bulk` (delay, mutate, queue)
//! - Replaying delay entries with a `Delayer`
//! - Consuming the main stream with a locked, offset-tracked `Consumer`
//! - Trimming processed entries with a consumer-aware `Trimmer`
//!
//! Run with: cargo run --example pipeline

use redstream::{ConsumerConfig, DelayerConfig, ProducerConfig, Record, Redstream, TrimmerConfig};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct ProductChange {
    id: u64,
    price_cents: u64,
}

struct Product {
    id: u64,
    price_cents: u64,
}

impl Record for Product {
    type Payload = ProductChange;

    fn redstream_payload(&self) -> ProductChange {
        ProductChange {
            id: self.id,
            price_cents: self.price_cents,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("redstream=debug")
        .init();

    println!("=== Redstream Pipeline Example ===\n");

    let redstream = Redstream::in_memory().with_namespace("shop");
    let stream = Product::redstream_name();

    let consumer_config = ConsumerConfig::new()
        .with_batch_size(100)
        .with_block(Duration::from_millis(200));

    let delayer = Arc::new(redstream.delayer(
        &stream,
        DelayerConfig::new(Duration::from_millis(500))
            .with_ready_margin(Duration::from_millis(50))
            .with_consumer(consumer_config.clone()),
    )?);
    let consumer = Arc::new(redstream.consumer(&stream, "indexer", consumer_config)?);
    let trimmer = Arc::new(redstream.trimmer(
        &stream,
        TrimmerConfig::consumers(["indexer"]).with_interval(Duration::from_millis(300)),
    )?);

    let indexed = Arc::new(AtomicUsize::new(0));

    let workers = vec![
        tokio::spawn({
            let delayer = delayer.clone();
            async move { delayer.run().await }
        }),
        tokio::spawn({
            let consumer = consumer.clone();
            let indexed = indexed.clone();
            async move {
                consumer
                    .run(move |messages| {
                        for message in &messages {
                            println!(
                                "  [indexer] {} -> {}",
                                message.id(),
                                message.payload_raw().unwrap_or("")
                            );
                        }
                        indexed.fetch_add(messages.len(), Ordering::SeqCst);
                        async { Ok(()) }
                    })
                    .await
            }
        }),
        tokio::spawn({
            let trimmer = trimmer.clone();
            async move { trimmer.run().await }
        }),
    ];

    // Each change is written as a delay entry, then the "database update"
    // runs, then the change is queued for immediate delivery.
    let producer = redstream.producer(ProducerConfig::default())?;
    let products: Vec<Product> = (1..=5)
        .map(|id| Product {
            id,
            price_cents: id * 199,
        })
        .collect();

    producer
        .bulk(&products, || async {
            println!("[writer] Updating {} products", products.len());
            Ok::<_, redstream::RedstreamError>(())
        })
        .await?;

    // Queued entries arrive at once, replayed delay entries after 500ms
    tokio::time::sleep(Duration::from_secs(2)).await;

    let info = redstream.consumer_info(&stream, "indexer").await?;
    println!(
        "\n[stats] indexed {} messages, offset {:?}, {} pending",
        indexed.load(Ordering::SeqCst),
        info.offset.map(|id| id.to_string()),
        info.pending
    );

    for worker in workers {
        worker.abort();
    }

    println!("\n✓ Example completed successfully");
    Ok(())
}
