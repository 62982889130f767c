//! Single-pass stream source with optional capture-and-replay.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Record, Schema};
use crate::datum::Value;

/// Cost of one pass over a live stream.
pub(super) const COST_HINT: usize = 10;

/// Receiving half of a live record stream.
pub trait RecordReceiver: Send + 'static {
    /// Waits for the next record, returning `None` once the stream closes.
    ///
    /// The returned future must be cancel-safe: dropping it before it
    /// completes must not lose a record.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Arc<dyn Record>>> + Send + '_>>;
}

impl<R: Record> RecordReceiver for mpsc::Receiver<R> {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Arc<dyn Record>>> + Send + '_>> {
        Box::pin(async move {
            mpsc::Receiver::recv(self)
                .await
                .map(|r| Arc::new(r) as Arc<dyn Record>)
        })
    }
}

/// Catalog slot holding a stream's receiver until a query takes it.
pub(crate) type StreamSlot = Mutex<Option<Box<dyn RecordReceiver>>>;

/// A record whose layout is known only at run time, such as one output row
/// of a nested query.
#[derive(Debug, Clone)]
pub struct ValuesRecord {
    fields: Arc<[String]>,
    values: Vec<Value>,
}

impl ValuesRecord {
    pub fn new(fields: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { fields, values }
    }
}

impl Record for ValuesRecord {
    /// The layout travels with each source, not with the type.
    fn schema() -> Schema {
        Schema::default()
    }

    fn field(&self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|f| f == name)?;
        self.values.get(idx).cloned()
    }
}

/// Adapts the output rows of a nested query into a record stream.
pub(crate) struct RowReceiver {
    fields: Arc<[String]>,
    rx: mpsc::Receiver<Vec<Value>>,
}

impl RowReceiver {
    pub(crate) fn new(fields: Arc<[String]>, rx: mpsc::Receiver<Vec<Value>>) -> Self {
        Self { fields, rx }
    }
}

impl RecordReceiver for RowReceiver {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Arc<dyn Record>>> + Send + '_>> {
        Box::pin(async move {
            let values = self.rx.recv().await?;
            Some(Arc::new(ValuesRecord::new(self.fields.clone(), values)) as Arc<dyn Record>)
        })
    }
}

/// Cursor over a live stream.
///
/// In multi-pass mode every record read on the first pass is captured.
/// Rewinding after the first pass switches to replay; the number of records
/// a replay covers is fixed when it starts.
///
/// A source taken from a catalog slot returns its receiver to the slot if it
/// is dropped before its first read.
pub struct StreamSource {
    schema: Schema,
    rx: Option<Box<dyn RecordReceiver>>,
    home: Weak<StreamSlot>,
    multi_pass: bool,
    started: bool,
    captured: Vec<Arc<dyn Record>>,
    replay: Option<Replay>,
    current: Option<Arc<dyn Record>>,
}

#[derive(Debug, Clone, Copy)]
struct Replay {
    pos: usize,
    bound: usize,
}

impl StreamSource {
    pub fn new(schema: Schema, rx: Box<dyn RecordReceiver>) -> Self {
        Self {
            schema,
            rx: Some(rx),
            home: Weak::new(),
            multi_pass: false,
            started: false,
            captured: Vec::new(),
            replay: None,
            current: None,
        }
    }

    /// Takes the receiver out of `slot`, or returns `None` if another query
    /// holds it.
    pub(crate) fn take(schema: Schema, slot: &Arc<StreamSlot>) -> Option<Self> {
        let rx = slot.lock().take()?;
        let mut source = Self::new(schema, rx);
        source.home = Arc::downgrade(slot);
        Some(source)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn set_multi_pass(&mut self, multi_pass: bool) {
        self.multi_pass = multi_pass;
    }

    pub fn rewind(&mut self) {
        self.current = None;
        if self.multi_pass && self.started {
            self.replay = Some(Replay {
                pos: 0,
                bound: self.captured.len(),
            });
        }
    }

    pub async fn advance(&mut self) -> bool {
        if let Some(replay) = self.replay.as_mut() {
            self.current = if replay.pos < replay.bound {
                replay.pos += 1;
                self.captured.get(replay.pos - 1).cloned()
            } else {
                None
            };
            return self.current.is_some();
        }

        let Some(rx) = self.rx.as_mut() else {
            self.current = None;
            return false;
        };
        self.started = true;
        match rx.recv().await {
            Some(record) => {
                if self.multi_pass {
                    self.captured.push(record.clone());
                }
                self.current = Some(record);
                true
            }
            None => {
                self.rx = None;
                self.current = None;
                false
            }
        }
    }

    pub fn current(&self) -> Option<&dyn Record> {
        self.current.as_deref()
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        if self.started {
            return;
        }
        if let (Some(rx), Some(slot)) = (self.rx.take(), self.home.upgrade()) {
            *slot.lock() = Some(rx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Item {
        n: i64,
    }
    crate::impl_record!(Item { n });

    async fn drain(source: &mut StreamSource) -> Vec<Value> {
        let mut out = Vec::new();
        while source.advance().await {
            out.push(source.current().and_then(|r| r.field("n")).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_single_pass_does_not_replay() {
        let (tx, rx) = mpsc::channel(4);
        for n in 0..3 {
            tx.send(Item { n }).await.unwrap();
        }
        drop(tx);

        let mut source = StreamSource::new(Item::schema(), Box::new(rx));
        assert_eq!(drain(&mut source).await.len(), 3);
        source.rewind();
        assert!(drain(&mut source).await.is_empty());
    }

    #[tokio::test]
    async fn test_multi_pass_replays_captured() {
        let (tx, rx) = mpsc::channel(4);
        for n in 0..3 {
            tx.send(Item { n }).await.unwrap();
        }
        drop(tx);

        let mut source = StreamSource::new(Item::schema(), Box::new(rx));
        source.set_multi_pass(true);
        source.rewind();
        let first = drain(&mut source).await;
        source.rewind();
        let second = drain(&mut source).await;
        assert_eq!(first, second);
        assert_eq!(first, vec![Value::Int64(0), Value::Int64(1), Value::Int64(2)]);
    }

    #[tokio::test]
    async fn test_unread_source_returns_receiver() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Item { n: 1 }).await.unwrap();
        drop(tx);
        let rx: Box<dyn RecordReceiver> = Box::new(rx);
        let slot = Arc::new(Mutex::new(Some(rx)));

        let source = StreamSource::take(Item::schema(), &slot).unwrap();
        assert!(StreamSource::take(Item::schema(), &slot).is_none());
        drop(source);

        let mut source = StreamSource::take(Item::schema(), &slot).unwrap();
        assert_eq!(drain(&mut source).await, vec![Value::Int64(1)]);
        drop(source);
        assert!(slot.lock().is_none());
    }

    #[tokio::test]
    async fn test_values_record_field() {
        let fields: Arc<[String]> = vec!["a".to_string(), "b".to_string()].into();
        let record = ValuesRecord::new(fields, vec![Value::Int64(1), Value::from("x")]);
        assert_eq!(record.field("b"), Some(Value::from("x")));
        assert_eq!(record.field("c"), None);
    }
}
