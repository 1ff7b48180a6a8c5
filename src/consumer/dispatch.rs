//! Per-partition dispatch
//!
//! Each partition gets its own worker task and queue, and messages of one
//! partition are handled strictly in offset order. The fetch loop never waits
//! on a worker. When a partition's backlog reaches the high-water mark that
//! partition is paused at the broker, and its worker resumes it once the
//! backlog is down to half of that. A slow partition therefore only holds
//! back itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::TopicPartitionList;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::policy::{self, Disposition};
use super::{Delivery, MessageHandler};

/// Offset and fetch control over the partitions of one consumer
pub trait PartitionControl: Send + Sync + 'static {
    /// Record that a message has been fully handled
    fn mark_processed(&self, delivery: &Delivery) -> Result<(), KafkaError>;

    /// Stop fetching from a partition
    fn pause(&self, topic: &str, partition: i32) -> Result<(), KafkaError>;

    fn resume(&self, topic: &str, partition: i32) -> Result<(), KafkaError>;
}

fn partition_list(topic: &str, partition: i32) -> TopicPartitionList {
    let mut list = TopicPartitionList::new();
    list.add_partition(topic, partition);
    list
}

impl PartitionControl for StreamConsumer {
    fn mark_processed(&self, delivery: &Delivery) -> Result<(), KafkaError> {
        // The stored offset is the next one to read
        self.store_offset(&delivery.topic, delivery.partition, delivery.offset + 1)
    }

    fn pause(&self, topic: &str, partition: i32) -> Result<(), KafkaError> {
        Consumer::pause(self, &partition_list(topic, partition))
    }

    fn resume(&self, topic: &str, partition: i32) -> Result<(), KafkaError> {
        Consumer::resume(self, &partition_list(topic, partition))
    }
}

/// Hand one message to the handler and advance its offset.
pub async fn process_delivery<T: PartitionControl + ?Sized>(
    handler: &dyn MessageHandler,
    control: &T,
    delivery: Delivery,
) -> Disposition {
    let disposition = match delivery.payload.as_deref() {
        None | Some([]) => {
            tracing::warn!(
                topic = %delivery.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                "Received empty message"
            );
            Disposition::Empty
        }
        Some(_) => {
            tracing::debug!(
                topic = %delivery.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                "Received message"
            );
            policy::handle_outcome(&delivery, handler.handle(&delivery).await)
        }
    };

    if let Err(e) = control.mark_processed(&delivery) {
        tracing::warn!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            error = %e,
            "Failed to store offset"
        );
    }

    disposition
}

/// Messages queued for one partition and whether its fetch is paused
#[derive(Debug, Default)]
struct Backlog {
    queued: usize,
    paused: bool,
}

fn lock(backlog: &Mutex<Backlog>) -> MutexGuard<'_, Backlog> {
    backlog.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    tx: mpsc::UnboundedSender<Delivery>,
    backlog: Arc<Mutex<Backlog>>,
}

/// Routes deliveries to partition workers
pub struct PartitionDispatcher<T: PartitionControl> {
    handler: Arc<dyn MessageHandler>,
    control: Arc<T>,
    high_water: usize,
    workers: HashMap<(String, i32), Worker>,
    tasks: JoinSet<()>,
}

impl<T: PartitionControl> PartitionDispatcher<T> {
    /// `high_water` is the backlog at which a partition gets paused
    pub fn new(handler: Arc<dyn MessageHandler>, control: Arc<T>, high_water: usize) -> Self {
        Self {
            handler,
            control,
            high_water: high_water.max(1),
            workers: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Queue a delivery behind earlier ones of the same partition.
    ///
    /// Never waits. Pauses the partition when its backlog is full.
    pub fn dispatch(&mut self, delivery: Delivery) {
        let key = (delivery.topic.clone(), delivery.partition);

        let live = self
            .workers
            .get(&key)
            .is_some_and(|worker| !worker.tx.is_closed());
        if !live {
            self.replace_worker(key.clone());
        }
        let Some(worker) = self.workers.get(&key) else {
            return;
        };

        {
            let mut backlog = lock(&worker.backlog);
            backlog.queued += 1;
            if backlog.queued >= self.high_water && !backlog.paused {
                match self.control.pause(&key.0, key.1) {
                    Ok(()) => {
                        backlog.paused = true;
                        tracing::debug!(
                            topic = %key.0,
                            partition = key.1,
                            queued = backlog.queued,
                            "Partition backlog full, pausing fetch"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(topic = %key.0, partition = key.1, error = %e, "Failed to pause partition");
                    }
                }
            }
        }

        if let Err(mpsc::error::SendError(delivery)) = worker.tx.send(delivery) {
            // Worker died between the check and the send
            tracing::error!(
                topic = %delivery.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                "Partition worker stopped, restarting it"
            );
            self.replace_worker(key);
            self.dispatch(delivery);
        }
    }

    /// Number of partitions with a live worker
    pub fn active_partitions(&self) -> usize {
        self.workers.values().filter(|w| !w.tx.is_closed()).count()
    }

    /// Start a fresh worker for `key`, resuming the partition if a dead
    /// predecessor left it paused
    fn replace_worker(&mut self, key: (String, i32)) {
        if let Some(old) = self.workers.remove(&key) {
            if lock(&old.backlog).paused {
                if let Err(e) = self.control.resume(&key.0, key.1) {
                    tracing::warn!(topic = %key.0, partition = key.1, error = %e, "Failed to resume partition");
                }
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        let backlog = Arc::new(Mutex::new(Backlog::default()));
        let handler = self.handler.clone();
        let control = self.control.clone();
        let worker_backlog = backlog.clone();
        let low_water = self.high_water / 2;

        tracing::debug!(topic = %key.0, partition = key.1, "Starting partition worker");

        self.tasks.spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let (topic, partition) = (delivery.topic.clone(), delivery.partition);
                process_delivery(handler.as_ref(), control.as_ref(), delivery).await;

                let mut backlog = lock(&worker_backlog);
                backlog.queued = backlog.queued.saturating_sub(1);
                if backlog.paused && backlog.queued <= low_water {
                    match control.resume(&topic, partition) {
                        Ok(()) => {
                            backlog.paused = false;
                            tracing::debug!(topic = %topic, partition, "Partition backlog drained, resuming fetch");
                        }
                        Err(e) => {
                            tracing::warn!(topic = %topic, partition, error = %e, "Failed to resume partition");
                        }
                    }
                }
            }
        });

        self.workers.insert(key, Worker { tx, backlog });
    }

    /// Stop accepting messages and wait for queued ones to finish
    pub async fn drain(mut self) {
        self.workers.clear();

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Partition worker terminated abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeError;
    use crate::consumer::HandlerError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Records handled messages; partition 0 waits for a permit when gated
    struct RecordingHandler {
        seen: Mutex<Vec<(i32, i64)>>,
        gate: Option<Semaphore>,
    }

    impl RecordingHandler {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn gated() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                gate: Some(Semaphore::new(0)),
            }
        }

        fn seen(&self) -> Vec<(i32, i64)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
            if delivery.partition == 0 {
                match &self.gate {
                    Some(gate) => drop(gate.acquire().await.unwrap()),
                    // Partition 0 is slow so partitions interleave
                    None => tokio::time::sleep(Duration::from_millis(5)).await,
                }
            }
            self.seen
                .lock()
                .unwrap()
                .push((delivery.partition, delivery.offset));

            if delivery.payload.as_deref() == Some(b"bad") {
                return Err(HandlerError::Decode(DecodeError::NotAnObject));
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Flow {
        Pause(i32),
        Resume(i32),
    }

    #[derive(Default)]
    struct RecordingControl {
        stored: Mutex<Vec<(i32, i64)>>,
        flow: Mutex<Vec<Flow>>,
    }

    impl PartitionControl for RecordingControl {
        fn mark_processed(&self, delivery: &Delivery) -> Result<(), KafkaError> {
            self.stored
                .lock()
                .unwrap()
                .push((delivery.partition, delivery.offset + 1));
            Ok(())
        }

        fn pause(&self, _topic: &str, partition: i32) -> Result<(), KafkaError> {
            self.flow.lock().unwrap().push(Flow::Pause(partition));
            Ok(())
        }

        fn resume(&self, _topic: &str, partition: i32) -> Result<(), KafkaError> {
            self.flow.lock().unwrap().push(Flow::Resume(partition));
            Ok(())
        }
    }

    fn delivery(partition: i32, offset: i64, payload: &[u8]) -> Delivery {
        Delivery::new("calculator-events", partition, offset, Some(payload.to_vec()))
    }

    #[tokio::test]
    async fn test_process_delivery_stores_offset_even_on_failure() {
        let handler = RecordingHandler::new();
        let control = RecordingControl::default();

        let ok = process_delivery(&handler, &control, delivery(1, 10, b"{}")).await;
        let bad = process_delivery(&handler, &control, delivery(1, 11, b"bad")).await;
        let empty = process_delivery(&handler, &control, delivery(1, 12, b"")).await;

        assert_eq!(ok, Disposition::Processed);
        assert_eq!(bad, Disposition::Dropped);
        assert_eq!(empty, Disposition::Empty);
        assert_eq!(*control.stored.lock().unwrap(), vec![(1, 11), (1, 12), (1, 13)]);
        // Empty payloads never reach the handler
        assert_eq!(handler.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatcher_keeps_partition_order_and_survives_errors() {
        let handler = Arc::new(RecordingHandler::new());
        let control = Arc::new(RecordingControl::default());
        let mut dispatcher = PartitionDispatcher::new(handler.clone(), control.clone(), 4);

        for offset in 0..5 {
            let payload: &[u8] = if offset == 2 { b"bad" } else { b"{}" };
            dispatcher.dispatch(delivery(0, offset, payload));
            dispatcher.dispatch(delivery(1, offset, b"{}"));
        }
        assert_eq!(dispatcher.active_partitions(), 2);
        dispatcher.drain().await;

        let seen = handler.seen();
        assert_eq!(seen.len(), 10);
        for partition in [0, 1] {
            let offsets: Vec<i64> = seen
                .iter()
                .filter(|(p, _)| *p == partition)
                .map(|(_, o)| *o)
                .collect();
            assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
        }
        assert_eq!(control.stored.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_blocked_partition_does_not_stall_others() {
        let handler = Arc::new(RecordingHandler::gated());
        let control = Arc::new(RecordingControl::default());
        let mut dispatcher = PartitionDispatcher::new(handler.clone(), control.clone(), 2);

        for offset in 0..5 {
            dispatcher.dispatch(delivery(0, offset, b"{}"));
        }
        dispatcher.dispatch(delivery(1, 0, b"{}"));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !control.stored.lock().unwrap().contains(&(1, 1)) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("partition 1 stalled behind partition 0");

        assert_eq!(handler.seen(), vec![(1, 0)]);
        assert_eq!(*control.flow.lock().unwrap(), vec![Flow::Pause(0)]);

        handler.gate.as_ref().unwrap().add_permits(1);
        dispatcher.drain().await;

        let partition0: Vec<i64> = handler
            .seen()
            .into_iter()
            .filter(|(p, _)| *p == 0)
            .map(|(_, o)| o)
            .collect();
        assert_eq!(partition0, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            *control.flow.lock().unwrap(),
            vec![Flow::Pause(0), Flow::Resume(0)]
        );
    }
}
