use redstream::{
    ConsumerConfig, DelayerConfig, LogStore, ProducerConfig, Record, Redstream, RunOutcome,
    StreamId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Order {
    id: u64,
}

impl Record for Order {
    type Payload = u64;

    fn redstream_payload(&self) -> u64 {
        self.id
    }
}

fn delayer_config(delay: Duration, batch_size: usize) -> DelayerConfig {
    DelayerConfig::new(delay)
        .with_ready_margin(Duration::from_millis(20))
        .with_consumer(
            ConsumerConfig::new()
                .with_batch_size(batch_size)
                .with_block(Duration::from_millis(50)),
        )
}

async fn payloads(store: &Arc<dyn LogStore>, key: &str) -> Vec<String> {
    store
        .range(key, StreamId::MIN, StreamId::MAX, usize::MAX)
        .await
        .unwrap()
        .iter()
        .filter_map(|e| e.payload().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_young_entries_stay_invisible_until_mature() {
    let redstream = Redstream::in_memory();
    let producer = redstream.producer(ProducerConfig::default()).unwrap();
    let delay = Duration::from_millis(300);
    let delayer = redstream.delayer("orders", delayer_config(delay, 100)).unwrap();
    let store = redstream.store().clone();

    let written = Instant::now();
    producer.delay(&Order { id: 1 }).await.unwrap();

    let (outcome, seen_early) = tokio::join!(delayer.run_once(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.length("redstream:stream:orders").await.unwrap()
    });

    assert_eq!(seen_early, 0);
    assert_eq!(outcome.unwrap(), RunOutcome::Processed(1));
    assert!(written.elapsed() >= delay);
    assert_eq!(payloads(&store, "redstream:stream:orders").await, vec!["1"]);
    assert_eq!(store.length("redstream:stream:orders.delay").await.unwrap(), 0);
}

#[tokio::test]
async fn test_replay_preserves_write_order_across_flushes() {
    let redstream = Redstream::in_memory();
    let producer = redstream.producer(ProducerConfig::default()).unwrap();
    let delay = Duration::from_millis(200);
    let delayer = redstream.delayer("orders", delayer_config(delay, 3)).unwrap();
    let store = redstream.store().clone();

    producer
        .bulk_delay(&[Order { id: 1 }, Order { id: 2 }])
        .await
        .unwrap();
    tokio::time::sleep(delay + Duration::from_millis(50)).await;
    producer
        .bulk_delay(&[Order { id: 3 }, Order { id: 4 }])
        .await
        .unwrap();

    // First batch: 1 and 2 are flushed before waiting on 3
    assert_eq!(delayer.run_once().await.unwrap(), RunOutcome::Processed(3));
    assert_eq!(delayer.run_once().await.unwrap(), RunOutcome::Processed(1));
    assert_eq!(delayer.run_once().await.unwrap(), RunOutcome::Idle);

    assert_eq!(
        payloads(&store, "redstream:stream:orders").await,
        vec!["1", "2", "3", "4"]
    );
    assert!(payloads(&store, "redstream:stream:orders.delay").await.is_empty());

    let offset = redstream
        .consumer_offset("orders.delay", "delayer")
        .await
        .unwrap();
    assert!(offset.is_some());
}

#[tokio::test]
async fn test_commits_flushed_entries_before_waiting() {
    let redstream = Redstream::in_memory();
    let producer = redstream.producer(ProducerConfig::default()).unwrap();
    let delay = Duration::from_millis(300);
    let delayer = redstream.delayer("orders", delayer_config(delay, 10)).unwrap();
    let store = redstream.store().clone();

    let mature = producer
        .bulk_delay(&[Order { id: 1 }, Order { id: 2 }])
        .await
        .unwrap();
    tokio::time::sleep(delay + Duration::from_millis(50)).await;
    let young = producer.delay(&Order { id: 3 }).await.unwrap();

    let (outcome, (offset_while_waiting, replayed_while_waiting)) =
        tokio::join!(delayer.run_once(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let offset = redstream
                .consumer_offset("orders.delay", "delayer")
                .await
                .unwrap();
            let replayed = payloads(&store, "redstream:stream:orders").await;
            (offset, replayed)
        });

    assert_eq!(offset_while_waiting, Some(mature[1]));
    assert_eq!(replayed_while_waiting, vec!["1", "2"]);

    assert_eq!(outcome.unwrap(), RunOutcome::Processed(3));
    assert_eq!(
        redstream
            .consumer_offset("orders.delay", "delayer")
            .await
            .unwrap(),
        Some(young)
    );
    assert_eq!(
        payloads(&store, "redstream:stream:orders").await,
        vec!["1", "2", "3"]
    );
}

#[tokio::test]
async fn test_bulk_leaves_delay_entries_when_critical_section_fails() {
    let redstream = Redstream::in_memory();
    let producer = redstream.producer(ProducerConfig::default()).unwrap();
    let delayer = redstream
        .delayer("orders", delayer_config(Duration::ZERO, 100))
        .unwrap();
    let store = redstream.store().clone();

    let result: Result<(), anyhow::Error> = producer
        .bulk(&[Order { id: 7 }], || async { Err(anyhow::anyhow!("crashed")) })
        .await;
    assert!(result.is_err());
    assert!(payloads(&store, "redstream:stream:orders").await.is_empty());

    delayer.run_once().await.unwrap();
    assert_eq!(payloads(&store, "redstream:stream:orders").await, vec!["7"]);
}
