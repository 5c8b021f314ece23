//! Bounded record buffer.

use tokio::sync::mpsc;

use crate::error::SpoolError;
use crate::fetch::Record;

/// Records held in memory between fetch and write.
pub const SPOOL_CAPACITY: usize = 5000;

/// Create a buffer holding at most `capacity` records (at least one).
pub fn spool_buffer(capacity: usize) -> (SpoolProducer, SpoolConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SpoolProducer { tx }, SpoolConsumer { rx })
}

/// Sending half. Dropping it closes the buffer.
#[derive(Debug)]
pub struct SpoolProducer {
    tx: mpsc::Sender<Record>,
}

impl SpoolProducer {
    /// Append a record, waiting while the buffer is full.
    pub async fn push(&self, record: Record) -> Result<(), SpoolError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| SpoolError::BufferClosed)
    }

    /// Records currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct SpoolConsumer {
    rx: mpsc::Receiver<Record>,
}

impl SpoolConsumer {
    /// Next record in FIFO order, or `None` once the producer is gone and
    /// everything buffered has been taken.
    pub async fn pop(&mut self) -> Option<Record> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let (producer, mut consumer) = spool_buffer(8);
        for line in ["a", "b", "c"] {
            producer.push(Record::from(line)).await.unwrap();
        }
        drop(producer);

        let mut popped = Vec::new();
        while let Some(record) = consumer.pop().await {
            popped.push(record.into_inner());
        }
        assert_eq!(popped, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let (producer, mut consumer) = spool_buffer(2);
        producer.push(Record::from("a")).await.unwrap();
        producer.push(Record::from("b")).await.unwrap();
        assert_eq!(producer.len(), 2);

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), producer.push(Record::from("c"))).await;
        assert!(blocked.is_err(), "push should wait while the buffer is full");

        assert_eq!(consumer.pop().await, Some(Record::from("a")));
        producer.push(Record::from("c")).await.unwrap();
        assert_eq!(producer.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_holds_one_record() {
        let (producer, mut consumer) = spool_buffer(0);
        producer.push(Record::from("only")).await.unwrap();
        assert_eq!(producer.len(), 1);

        let next = producer.push(Record::from("next"));
        let blocked = tokio::time::timeout(Duration::from_millis(50), next).await;
        assert!(blocked.is_err());
        assert_eq!(consumer.pop().await, Some(Record::from("only")));
    }

    #[tokio::test]
    async fn test_pop_returns_none_after_close() {
        let (producer, mut consumer) = spool_buffer(1);
        drop(producer);
        assert_eq!(consumer.pop().await, None);
    }

    #[tokio::test]
    async fn test_push_after_consumer_dropped_fails() {
        let (producer, consumer) = spool_buffer(1);
        drop(consumer);

        let err = producer.push(Record::from("a")).await.unwrap_err();
        assert!(matches!(err, SpoolError::BufferClosed));
    }

    #[test]
    fn test_capacity_constant() {
        assert_eq!(SPOOL_CAPACITY, 5000);
    }
}
