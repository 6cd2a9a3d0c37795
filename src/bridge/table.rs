//! Topic registration and per-topic data plane.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{Duration, Instant, with_deadline};
use heapless::Vec;

use super::codec::{Codec, Decoder, EncodeContext, Encoder, Payload};
use super::namespace::Namespace;
use crate::config::{BridgeOptions, MAX_TOPICS};
use crate::device::DeviceId;
use crate::error::TopicError;
use crate::hub::BoundedQueue;
use crate::packet::QoS;

/// Items each topic queue can hold.
pub const TOPIC_QUEUE_DEPTH: usize = 4;

/// Which way a topic carries data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Local queue to broker.
    Publish,
    /// Broker to local queue.
    Subscribe,
}

/// Stable reference to a registered topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TopicHandle(usize);

impl TopicHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Boot-time description of one route.
pub struct TopicDescriptor<'a, T> {
    pub suffix: &'a str,
    pub direction: Direction,
    pub qos: QoS,
    pub codec: Codec<'a, T>,
}

impl<'a, T> TopicDescriptor<'a, T> {
    pub fn new(suffix: &'a str, direction: Direction, qos: QoS, codec: Codec<'a, T>) -> Self {
        Self {
            suffix,
            direction,
            qos,
            codec,
        }
    }

    pub fn publish(suffix: &'a str, qos: QoS, encoder: &'a mut (dyn Encoder<T> + Send)) -> Self {
        Self::new(suffix, Direction::Publish, qos, Codec::Encoder(encoder))
    }

    pub fn subscribe(
        suffix: &'a str,
        qos: QoS,
        decoder: &'a mut (dyn Decoder<T> + Send),
    ) -> Self {
        Self::new(suffix, Direction::Subscribe, qos, Codec::Decoder(decoder))
    }

    fn codec_matches(&self) -> bool {
        match self.direction {
            Direction::Publish => self.codec.is_encoder(),
            Direction::Subscribe => self.codec.is_decoder(),
        }
    }
}

struct Topic<'a, T, const DEPTH: usize> {
    suffix: &'a str,
    direction: Direction,
    qos: QoS,
    /// Held for every codec call and every producer send.
    codec: Mutex<CriticalSectionRawMutex, Codec<'a, T>>,
    queue: BoundedQueue<T, DEPTH>,
}

/// The bridge's routes, fixed once the bridge starts.
///
/// Each topic owns its queue and a mutex that serializes codec calls against
/// producers feeding the same topic. Topics are otherwise independent.
pub struct TopicTable<'a, T, const MAX: usize = MAX_TOPICS, const DEPTH: usize = TOPIC_QUEUE_DEPTH>
{
    namespace: Namespace,
    topics: Vec<Topic<'a, T, DEPTH>, MAX>,
    io_timeout: Duration,
    sealed: AtomicBool,
}

impl<'a, T, const MAX: usize, const DEPTH: usize> TopicTable<'a, T, MAX, DEPTH> {
    /// `io_timeout` bounds every mutex acquisition and queue wait.
    pub fn new(namespace: Namespace, io_timeout: Duration) -> Self {
        Self {
            namespace,
            topics: Vec::new(),
            io_timeout,
            sealed: AtomicBool::new(false),
        }
    }

    /// Table for `device_id` under `options.root`.
    pub fn for_device(device_id: &DeviceId, options: &BridgeOptions) -> Result<Self, TopicError> {
        Ok(Self::new(
            Namespace::new(options.root, device_id)?,
            options.io_timeout,
        ))
    }

    /// Adds a route. Rejected descriptors leave the table unchanged.
    pub fn register_topic(
        &mut self,
        descriptor: TopicDescriptor<'a, T>,
    ) -> Result<TopicHandle, TopicError> {
        if self.is_sealed() {
            return Err(TopicError::Sealed);
        }
        if !descriptor.codec_matches() {
            return Err(TopicError::CodecMismatch);
        }
        self.namespace.validate(descriptor.suffix)?;
        if self
            .topics
            .iter()
            .any(|t| t.direction == descriptor.direction && t.suffix == descriptor.suffix)
        {
            return Err(TopicError::InvalidArgument);
        }

        let suffix = descriptor.suffix;
        self.topics
            .push(Topic {
                suffix: descriptor.suffix,
                direction: descriptor.direction,
                qos: descriptor.qos,
                codec: Mutex::new(descriptor.codec),
                queue: BoundedQueue::new(),
            })
            .map_err(|_| TopicError::Full)?;
        debug!("bridge: registered topic {}", suffix);
        Ok(TopicHandle(self.topics.len() - 1))
    }

    /// Freezes the topic set.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn suffix(&self, handle: TopicHandle) -> Option<&'a str> {
        self.topics.get(handle.0).map(|t| t.suffix)
    }

    pub fn qos(&self, handle: TopicHandle) -> Option<QoS> {
        self.topics.get(handle.0).map(|t| t.qos)
    }

    /// Handles of every topic with `direction`, in registration order.
    pub fn handles(&self, direction: Direction) -> impl Iterator<Item = TopicHandle> + '_ {
        self.topics
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.direction == direction)
            .map(|(i, _)| TopicHandle(i))
    }

    fn topic(&self, handle: TopicHandle) -> Result<&Topic<'a, T, DEPTH>, TopicError> {
        self.topics.get(handle.0).ok_or(TopicError::UnknownTopic)
    }

    async fn lock<'t>(
        &self,
        topic: &'t Topic<'a, T, DEPTH>,
    ) -> Result<MutexGuard<'t, CriticalSectionRawMutex, Codec<'a, T>>, TopicError> {
        self.lock_until(topic, Instant::now() + self.io_timeout)
            .await
    }

    async fn lock_until<'t>(
        &self,
        topic: &'t Topic<'a, T, DEPTH>,
        deadline: Instant,
    ) -> Result<MutexGuard<'t, CriticalSectionRawMutex, Codec<'a, T>>, TopicError> {
        with_deadline(deadline, topic.codec.lock())
            .await
            .map_err(|_| TopicError::Busy)
    }

    /// Queues `item` on a publish topic. Producers call this from their own
    /// tasks; the whole call is bounded by the data-plane timeout.
    ///
    /// The topic mutex is only held for the push itself, so the bridge can
    /// drain the queue while a producer waits for space.
    pub async fn send(&self, handle: TopicHandle, item: T) -> Result<(), TopicError> {
        let topic = self.topic(handle)?;
        if topic.direction != Direction::Publish {
            return Err(TopicError::InvalidArgument);
        }
        let deadline = Instant::now() + self.io_timeout;
        let mut item = item;
        loop {
            {
                let _guard = self.lock_until(topic, deadline).await?;
                match topic.queue.try_send(item) {
                    Ok(()) => return Ok(()),
                    Err(rejected) => item = rejected,
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::from_ticks(0) || !topic.queue.wait_for_space(remaining).await
            {
                return Err(TopicError::QueueFull);
            }
        }
    }

    /// Takes the oldest decoded item of a subscribe topic, waiting up to
    /// `timeout` for one.
    pub async fn receive(
        &self,
        handle: TopicHandle,
        timeout: Duration,
    ) -> Result<Option<T>, TopicError> {
        let topic = self.topic(handle)?;
        if topic.direction != Direction::Subscribe {
            return Err(TopicError::InvalidArgument);
        }
        Ok(topic.queue.receive(timeout).await)
    }

    /// Drains one queued item of a publish topic through its encoder into
    /// `out`. Returns `false` when nothing was queued.
    pub async fn encode_next(
        &self,
        handle: TopicHandle,
        ctx: &EncodeContext<'_>,
        out: &mut Payload,
    ) -> Result<bool, TopicError> {
        let topic = self.topic(handle)?;
        let mut codec = self.lock(topic).await?;
        let Codec::Encoder(encoder) = &mut *codec else {
            return Err(TopicError::CodecMismatch);
        };
        let Some(item) = topic.queue.try_receive() else {
            return Ok(false);
        };
        out.clear();
        encoder.encode(&item, ctx, out)?;
        Ok(true)
    }

    /// Routes an inbound payload to the subscribe topic whose suffix equals
    /// `suffix` exactly, decodes it and queues the result.
    ///
    /// Returns `Ok(None)` when no subscribe topic has that suffix.
    pub async fn dispatch(
        &self,
        suffix: &str,
        payload: &[u8],
    ) -> Result<Option<TopicHandle>, TopicError> {
        let Some(index) = self
            .topics
            .iter()
            .position(|t| t.direction == Direction::Subscribe && t.suffix == suffix)
        else {
            return Ok(None);
        };
        let handle = TopicHandle(index);
        let topic = &self.topics[index];

        let mut codec = self.lock(topic).await?;
        let Codec::Decoder(decoder) = &mut *codec else {
            return Err(TopicError::CodecMismatch);
        };
        let item = decoder.decode(payload)?;
        topic
            .queue
            .try_send(item)
            .map_err(|_| TopicError::QueueFull)?;
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use core::fmt::Write;
    use embassy_futures::block_on;

    type Table<'a> = TopicTable<'a, u32, 3, 2>;
    type Desc<'a> = TopicDescriptor<'a, u32>;

    fn table<'a>() -> Table<'a> {
        let device = DeviceId::from_mac([0, 1, 2, 3, 4, 5]);
        let namespace = Namespace::new("titanium", &device).unwrap();
        TopicTable::new(namespace, Duration::from_millis(10))
    }

    fn render(item: &u32, _: &EncodeContext<'_>, out: &mut Payload) -> Result<(), CodecError> {
        write!(out, "{{\"value\": {item}}}").map_err(|_| CodecError::BufferTooSmall)
    }

    fn parse(payload: &[u8]) -> Result<u32, CodecError> {
        core::str::from_utf8(payload)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or(CodecError::Malformed)
    }

    #[test]
    fn codec_must_match_direction() {
        let mut encoder = render;
        let mut decoder = parse;
        let mut table = table();

        let mismatched = Desc::new(
            "sensor",
            Direction::Subscribe,
            QoS::AtMostOnce,
            Codec::Encoder(&mut encoder),
        );
        assert_eq!(
            table.register_topic(mismatched).err(),
            Some(TopicError::CodecMismatch)
        );
        let mismatched = Desc::new(
            "config",
            Direction::Publish,
            QoS::AtMostOnce,
            Codec::Decoder(&mut decoder),
        );
        assert_eq!(
            table.register_topic(mismatched).err(),
            Some(TopicError::CodecMismatch)
        );
        assert!(table.is_empty());
    }

    #[test]
    fn registration_past_capacity_is_full() {
        let (mut a, mut b, mut c, mut d) = (render, render, render, render);
        let mut table = table();
        table
            .register_topic(Desc::publish("a", QoS::AtMostOnce, &mut a))
            .unwrap();
        table
            .register_topic(Desc::publish("b", QoS::AtMostOnce, &mut b))
            .unwrap();
        table
            .register_topic(Desc::publish("c", QoS::AtMostOnce, &mut c))
            .unwrap();
        assert_eq!(
            table
                .register_topic(Desc::publish("d", QoS::AtMostOnce, &mut d))
                .err(),
            Some(TopicError::Full)
        );
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn sealed_table_rejects_registration() {
        let mut encoder = render;
        let mut table = table();
        table.seal();
        assert_eq!(
            table
                .register_topic(Desc::publish("a", QoS::AtMostOnce, &mut encoder))
                .err(),
            Some(TopicError::Sealed)
        );
    }

    #[test]
    fn encode_next_drains_one_item() {
        let mut encoder = render;
        let mut table = table();
        let handle = table
            .register_topic(Desc::publish("sensor", QoS::AtMostOnce, &mut encoder))
            .unwrap();
        let device = DeviceId::unknown();
        let ctx = EncodeContext {
            device_id: &device,
            timestamp: 0,
        };
        let mut out = Payload::new();

        assert_eq!(block_on(table.encode_next(handle, &ctx, &mut out)), Ok(false));

        block_on(table.send(handle, 7)).unwrap();
        block_on(table.send(handle, 8)).unwrap();
        assert_eq!(block_on(table.send(handle, 9)), Err(TopicError::QueueFull));

        assert_eq!(block_on(table.encode_next(handle, &ctx, &mut out)), Ok(true));
        assert_eq!(out.as_str(), "{\"value\": 7}");
    }

    #[test]
    fn producer_waiting_for_space_does_not_block_the_drain() {
        let mut encoder = render;
        let device = DeviceId::from_mac([0, 1, 2, 3, 4, 5]);
        let namespace = Namespace::new("titanium", &device).unwrap();
        let mut table: TopicTable<'_, u32, 1, 1> =
            TopicTable::new(namespace, Duration::from_millis(200));
        let handle = table
            .register_topic(Desc::publish("sensor", QoS::AtMostOnce, &mut encoder))
            .unwrap();
        block_on(table.send(handle, 1)).unwrap();

        let ctx = EncodeContext {
            device_id: &device,
            timestamp: 0,
        };
        let mut out = Payload::new();
        let started = Instant::now();
        let (sent, drained) = block_on(embassy_futures::join::join(
            table.send(handle, 2),
            async {
                embassy_time::Timer::after_millis(5).await;
                table.encode_next(handle, &ctx, &mut out).await
            },
        ));
        assert_eq!(sent, Ok(()));
        assert_eq!(drained, Ok(true));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(out.as_str(), "{\"value\": 1}");

        assert_eq!(block_on(table.encode_next(handle, &ctx, &mut out)), Ok(true));
        assert_eq!(out.as_str(), "{\"value\": 2}");
    }

    #[test]
    fn dispatch_matches_suffix_exactly() {
        let mut config = parse;
        let mut sensor_config = parse;
        let mut table = table();
        let config = table
            .register_topic(Desc::subscribe("config", QoS::AtLeastOnce, &mut config))
            .unwrap();
        let sensor_config = table
            .register_topic(Desc::subscribe(
                "sensor_config",
                QoS::AtLeastOnce,
                &mut sensor_config,
            ))
            .unwrap();

        assert_eq!(block_on(table.dispatch("config", b"5")), Ok(Some(config)));
        assert_eq!(
            block_on(table.receive(config, Duration::from_millis(1))),
            Ok(Some(5))
        );
        assert_eq!(
            block_on(table.receive(sensor_config, Duration::from_millis(1))),
            Ok(None)
        );

        assert_eq!(block_on(table.dispatch("fig", b"5")), Ok(None));
        assert_eq!(
            block_on(table.dispatch("sensor_config", b"nope")),
            Err(TopicError::Codec(CodecError::Malformed))
        );
    }
}
