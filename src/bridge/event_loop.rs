use embassy_time::{Instant, Timer};

use super::client::BrokerClient;
use super::codec::{EncodeContext, Payload};
use super::table::{Direction, TOPIC_QUEUE_DEPTH, TopicTable};
use crate::config::{BridgeOptions, MAX_TOPICS};
use crate::fmt::Dbg;
use crate::hub::{EventBits, Hub, RuntimeContext};
use crate::supervisor::{Priority, Runnable};

/// Stack the bridge task needs for the session buffers and one payload.
pub const BRIDGE_STACK_SIZE: usize = 8192;

/// Moves data between the topic table and the broker while the uplink is up.
///
/// Each tick the bridge first lines the session up with [`EventBits::UPLINK`],
/// then drains at most one item per publish topic and finally services inbound
/// messages until the tick ends.
pub struct Bridge<
    't,
    'c,
    C,
    T,
    const MAX: usize = MAX_TOPICS,
    const DEPTH: usize = TOPIC_QUEUE_DEPTH,
> {
    client: C,
    table: &'t TopicTable<'c, T, MAX, DEPTH>,
    options: BridgeOptions,
    payload: Payload,
}

impl<'t, 'c, C, T, const MAX: usize, const DEPTH: usize> Bridge<'t, 'c, C, T, MAX, DEPTH>
where
    C: BrokerClient,
{
    pub fn new(client: C, table: &'t TopicTable<'c, T, MAX, DEPTH>, options: BridgeOptions) -> Self {
        Self {
            client,
            table,
            options,
            payload: Payload::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Connects when the uplink appeared and disconnects when it went away.
    /// Returns whether the session is up afterwards.
    pub async fn poll_link(&mut self, hub: &Hub) -> bool {
        let uplink = hub.events().is_set(EventBits::UPLINK);
        match (uplink, self.client.is_connected()) {
            (true, false) => {
                info!("bridge: uplink available, connecting");
                match self.client.connect().await {
                    Ok(()) => self.subscribe_all().await,
                    Err(e) => warn!("bridge: connect failed: {:?}", Dbg(&e)),
                }
            }
            (false, true) => {
                info!("bridge: uplink lost, disconnecting");
                self.client.disconnect().await;
            }
            _ => {}
        }
        self.client.is_connected()
    }

    /// Subscribes every subscribe topic. A refused topic does not keep the
    /// others from being subscribed.
    async fn subscribe_all(&mut self) {
        let table = self.table;
        for handle in table.handles(Direction::Subscribe) {
            let (Some(suffix), Some(qos)) = (table.suffix(handle), table.qos(handle)) else {
                continue;
            };
            let topic = match table.namespace().topic(suffix) {
                Ok(topic) => topic,
                Err(e) => {
                    warn!("bridge: no topic for {}: {:?}", suffix, e);
                    continue;
                }
            };
            if let Err(e) = self.client.subscribe(&topic, qos).await {
                warn!("bridge: subscribe {} failed: {:?}", topic.as_str(), Dbg(&e));
            }
        }
    }

    /// Publishes at most one queued item per publish topic.
    ///
    /// Nothing is published before time is synchronized. The uplink is
    /// rechecked before every topic so a link lost mid-cycle stops the cycle.
    pub async fn publish_tick(&mut self, ctx: &RuntimeContext<'_>) {
        let events = ctx.hub.events();
        if !self.client.is_connected()
            || !events.is_set(EventBits::UPLINK | EventBits::TIME_SYNCHRONIZED)
        {
            return;
        }
        let Some(timestamp) = ctx.hub.unix_time() else {
            return;
        };
        let encode_ctx = EncodeContext {
            device_id: ctx.device_id,
            timestamp,
        };

        let table = self.table;
        for handle in table.handles(Direction::Publish) {
            if !events.is_set(EventBits::UPLINK) || !self.client.is_connected() {
                debug!("bridge: uplink gone, ending publish cycle");
                break;
            }
            let (Some(suffix), Some(qos)) = (table.suffix(handle), table.qos(handle)) else {
                continue;
            };
            match table.encode_next(handle, &encode_ctx, &mut self.payload).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("bridge: encoding {} failed: {:?}", suffix, e);
                    continue;
                }
            }
            let Ok(topic) = table.namespace().topic(suffix) else {
                continue;
            };
            match self
                .client
                .publish(&topic, self.payload.as_bytes(), qos)
                .await
            {
                Ok(()) => trace!("bridge: published {}", topic.as_str()),
                Err(e) => warn!("bridge: publish {} failed: {:?}", topic.as_str(), Dbg(&e)),
            }
        }
    }

    /// Routes inbound messages to their subscribe topics until `until`.
    pub async fn service_inbound(&mut self, until: Instant) {
        let table = self.table;
        while self.client.is_connected() {
            let now = Instant::now();
            if now >= until {
                break;
            }
            let message = match self.client.poll(until - now).await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) => {
                    warn!("bridge: receive failed: {:?}", Dbg(&e));
                    break;
                }
            };
            let Some(suffix) = table.namespace().strip(message.topic) else {
                debug!("bridge: ignoring foreign topic {}", message.topic);
                continue;
            };
            match table.dispatch(suffix, message.payload).await {
                Ok(Some(_)) => trace!("bridge: routed {}", suffix),
                Ok(None) => debug!("bridge: no route for {}", suffix),
                Err(e) => warn!("bridge: dropping message on {}: {:?}", suffix, e),
            }
        }
    }

    /// One bridge tick.
    pub async fn step(&mut self, ctx: &RuntimeContext<'_>) {
        let deadline = Instant::now() + self.options.tick;
        if self.poll_link(ctx.hub).await {
            self.publish_tick(ctx).await;
            self.service_inbound(deadline).await;
        }
        Timer::at(deadline).await;
    }
}

impl<C, T, const MAX: usize, const DEPTH: usize> Runnable for Bridge<'_, '_, C, T, MAX, DEPTH>
where
    C: BrokerClient,
{
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn priority(&self) -> Priority {
        Priority::SERVICE
    }

    fn stack_size(&self) -> usize {
        BRIDGE_STACK_SIZE
    }

    async fn run(&mut self, ctx: &RuntimeContext<'_>) {
        if let Err(e) = ctx.hub.validate() {
            error!("bridge: {:?}, exiting", e);
            return;
        }
        self.table.seal();
        info!(
            "bridge: routing {} topics under {}",
            self.table.len(),
            self.table.namespace().prefix()
        );

        loop {
            self.step(ctx).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::TopicDescriptor;
    use crate::device::DeviceId;
    use crate::error::CodecError;
    use crate::packet::{Publish, QoS};
    use core::fmt::Write;
    use embassy_futures::block_on;
    use embassy_time::Duration;
    use std::collections::VecDeque;
    use std::string::{String, ToString};
    use std::vec::Vec;

    type Desc<'a> = TopicDescriptor<'a, u32>;

    /// Records what the bridge asked of the broker.
    #[derive(Default)]
    struct FakeClient<'h> {
        connected: bool,
        connects: usize,
        subscribed: Vec<String>,
        published: Vec<(String, String)>,
        inbound: VecDeque<(String, Vec<u8>)>,
        current: Option<(String, Vec<u8>)>,
        /// Clears the uplink from inside `publish`, as a driver callback would.
        drop_uplink: Option<&'h Hub>,
        /// Topics the broker refuses to subscribe or publish.
        refused: Vec<String>,
        refusals: Vec<String>,
    }

    impl FakeClient<'_> {
        fn refusing(topics: &[&str]) -> Self {
            Self {
                refused: topics.iter().map(|t| t.to_string()).collect(),
                ..Self::default()
            }
        }

        fn refuse(&mut self, topic: &str) -> Result<(), ()> {
            if self.refused.iter().any(|t| t == topic) {
                self.refusals.push(topic.to_string());
                return Err(());
            }
            Ok(())
        }
    }

    impl BrokerClient for FakeClient<'_> {
        type Error = ();

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn connect(&mut self) -> Result<(), ()> {
            self.connects += 1;
            self.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.connected = false;
        }

        async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), ()> {
            self.refuse(topic)?;
            self.subscribed.push(topic.to_string());
            Ok(())
        }

        async fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> Result<(), ()> {
            if let Some(hub) = self.drop_uplink.take() {
                hub.events().clear_bits(EventBits::UPLINK);
            }
            self.refuse(topic)?;
            let payload = String::from_utf8_lossy(payload).into_owned();
            self.published.push((topic.to_string(), payload));
            Ok(())
        }

        async fn poll(&mut self, _timeout: Duration) -> Result<Option<Publish<'_>>, ()> {
            self.current = self.inbound.pop_front();
            Ok(self.current.as_ref().map(|(topic, payload)| Publish {
                topic,
                qos: QoS::AtMostOnce,
                payload,
                packet_id: None,
            }))
        }
    }

    fn render(item: &u32, ctx: &EncodeContext<'_>, out: &mut Payload) -> Result<(), CodecError> {
        write!(out, "{}:{item}", ctx.device_id).map_err(|_| CodecError::BufferTooSmall)
    }

    fn reject(_: &u32, _: &EncodeContext<'_>, _: &mut Payload) -> Result<(), CodecError> {
        Err(CodecError::MissingField)
    }

    fn parse(payload: &[u8]) -> Result<u32, CodecError> {
        core::str::from_utf8(payload)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::Malformed)
    }

    fn online_hub() -> Hub {
        let hub = Hub::new();
        hub.initialize();
        hub.events().set_bits(EventBits::UPLINK);
        hub.synchronize_time(1_700_000_000);
        hub
    }

    fn device() -> DeviceId {
        DeviceId::from_mac([0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6])
    }

    #[test]
    fn boot_subscribes_and_publishes_queued_items() {
        let (mut sensor, mut status, mut config) = (render, render, parse);
        let hub = online_hub();
        let device = device();
        let options = BridgeOptions::default();
        let mut table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        let sensor = table
            .register_topic(Desc::publish("sensor", QoS::AtMostOnce, &mut sensor))
            .unwrap();
        let status = table
            .register_topic(Desc::publish("status", QoS::AtLeastOnce, &mut status))
            .unwrap();
        table
            .register_topic(Desc::subscribe("config", QoS::AtLeastOnce, &mut config))
            .unwrap();
        block_on(table.send(sensor, 21)).unwrap();
        block_on(table.send(status, 1)).unwrap();

        let ctx = RuntimeContext::new(&hub, &device);
        let mut bridge = Bridge::new(FakeClient::default(), &table, options);
        assert!(block_on(bridge.poll_link(&hub)));
        block_on(bridge.publish_tick(&ctx));

        let client = bridge.client();
        assert_eq!(client.subscribed, ["/titanium/A1B2C3D4E5F6/config"]);
        assert_eq!(
            client.published,
            [
                (
                    "/titanium/A1B2C3D4E5F6/sensor".to_string(),
                    "A1B2C3D4E5F6:21".to_string()
                ),
                (
                    "/titanium/A1B2C3D4E5F6/status".to_string(),
                    "A1B2C3D4E5F6:1".to_string()
                ),
            ]
        );
    }

    #[test]
    fn nothing_is_published_before_time_sync() {
        let mut sensor = render;
        let hub = Hub::new();
        hub.initialize();
        hub.events().set_bits(EventBits::UPLINK);
        let device = device();
        let options = BridgeOptions::default();
        let mut table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        let sensor = table
            .register_topic(Desc::publish("sensor", QoS::AtMostOnce, &mut sensor))
            .unwrap();
        block_on(table.send(sensor, 1)).unwrap();

        let ctx = RuntimeContext::new(&hub, &device);
        let mut bridge = Bridge::new(FakeClient::default(), &table, options);
        assert!(block_on(bridge.poll_link(&hub)));
        block_on(bridge.publish_tick(&ctx));
        assert!(bridge.client().published.is_empty());
    }

    #[test]
    fn uplink_lost_mid_cycle_stops_publishing_until_it_returns() {
        let (mut first, mut second) = (render, render);
        let hub = online_hub();
        let device = device();
        let options = BridgeOptions::default();
        let mut table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        let first = table
            .register_topic(Desc::publish("first", QoS::AtMostOnce, &mut first))
            .unwrap();
        let second = table
            .register_topic(Desc::publish("second", QoS::AtMostOnce, &mut second))
            .unwrap();
        block_on(table.send(first, 1)).unwrap();
        block_on(table.send(second, 2)).unwrap();

        let ctx = RuntimeContext::new(&hub, &device);
        let client = FakeClient {
            drop_uplink: Some(&hub),
            ..FakeClient::default()
        };
        let mut bridge = Bridge::new(client, &table, options);
        assert!(block_on(bridge.poll_link(&hub)));
        block_on(bridge.publish_tick(&ctx));
        assert_eq!(bridge.client().published.len(), 1);

        assert!(!block_on(bridge.poll_link(&hub)));
        block_on(bridge.publish_tick(&ctx));
        assert_eq!(bridge.client().published.len(), 1);

        hub.events().set_bits(EventBits::UPLINK);
        assert!(block_on(bridge.poll_link(&hub)));
        assert_eq!(bridge.client().connects, 2);
        block_on(bridge.publish_tick(&ctx));
        let published = &bridge.client().published;
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].0, "/titanium/A1B2C3D4E5F6/second");
    }

    #[test]
    fn inbound_messages_route_on_exact_suffix() {
        let mut config = parse;
        let hub = online_hub();
        let device = device();
        let options = BridgeOptions::default();
        let mut table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        let config = table
            .register_topic(Desc::subscribe("config", QoS::AtLeastOnce, &mut config))
            .unwrap();

        let mut client = FakeClient::default();
        client.inbound.extend([
            ("/titanium/A1B2C3D4E5F6/sensor_config".to_string(), b"1".to_vec()),
            ("/titanium/A1B2C3D4E5F6/config".to_string(), b"2".to_vec()),
            ("/titanium/000000000000/config".to_string(), b"3".to_vec()),
        ]);
        let mut bridge = Bridge::new(client, &table, options);
        assert!(block_on(bridge.poll_link(&hub)));
        block_on(bridge.service_inbound(Instant::now() + Duration::from_millis(50)));

        assert_eq!(
            block_on(table.receive(config, Duration::from_millis(1))),
            Ok(Some(2))
        );
        assert_eq!(
            block_on(table.receive(config, Duration::from_millis(1))),
            Ok(None)
        );
    }

    #[test]
    fn run_exits_on_uninitialized_hub() {
        let hub = Hub::new();
        let device = device();
        let options = BridgeOptions::default();
        let table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        let mut bridge = Bridge::new(FakeClient::default(), &table, options);
        block_on(bridge.run(&RuntimeContext::new(&hub, &device)));
        assert!(!table.is_sealed());
        assert_eq!(bridge.client().connects, 0);
    }

    #[test]
    fn failing_topics_do_not_block_the_rest_of_the_tick() {
        let (mut broken, mut refused, mut sensor) = (reject, render, render);
        let hub = online_hub();
        let device = device();
        let options = BridgeOptions::default();
        let mut table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        let broken = table
            .register_topic(Desc::publish("broken", QoS::AtMostOnce, &mut broken))
            .unwrap();
        let refused = table
            .register_topic(Desc::publish("refused", QoS::AtMostOnce, &mut refused))
            .unwrap();
        let sensor = table
            .register_topic(Desc::publish("sensor", QoS::AtMostOnce, &mut sensor))
            .unwrap();
        for handle in [broken, refused, sensor] {
            block_on(table.send(handle, 3)).unwrap();
        }

        let ctx = RuntimeContext::new(&hub, &device);
        let client = FakeClient::refusing(&["/titanium/A1B2C3D4E5F6/refused"]);
        let mut bridge = Bridge::new(client, &table, options);
        assert!(block_on(bridge.poll_link(&hub)));
        block_on(bridge.publish_tick(&ctx));

        let client = bridge.client();
        assert_eq!(client.refusals, ["/titanium/A1B2C3D4E5F6/refused"]);
        assert_eq!(
            client.published,
            [(
                "/titanium/A1B2C3D4E5F6/sensor".to_string(),
                "A1B2C3D4E5F6:3".to_string()
            )]
        );
        assert!(client.is_connected());
    }

    #[test]
    fn refused_subscription_does_not_block_the_others() {
        let (mut a, mut b, mut c) = (parse, parse, parse);
        let hub = online_hub();
        let device = device();
        let options = BridgeOptions::default();
        let mut table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        table
            .register_topic(Desc::subscribe("a", QoS::AtLeastOnce, &mut a))
            .unwrap();
        table
            .register_topic(Desc::subscribe("b", QoS::AtLeastOnce, &mut b))
            .unwrap();
        table
            .register_topic(Desc::subscribe("c", QoS::AtLeastOnce, &mut c))
            .unwrap();

        let client = FakeClient::refusing(&["/titanium/A1B2C3D4E5F6/a"]);
        let mut bridge = Bridge::new(client, &table, options);
        assert!(block_on(bridge.poll_link(&hub)));

        let client = bridge.client();
        assert_eq!(client.refusals, ["/titanium/A1B2C3D4E5F6/a"]);
        assert_eq!(
            client.subscribed,
            ["/titanium/A1B2C3D4E5F6/b", "/titanium/A1B2C3D4E5F6/c"]
        );
    }

    #[test]
    fn undecodable_message_does_not_block_the_next() {
        let mut config = parse;
        let hub = online_hub();
        let device = device();
        let options = BridgeOptions::default();
        let mut table: TopicTable<'_, u32> = TopicTable::for_device(&device, &options).unwrap();
        let config = table
            .register_topic(Desc::subscribe("config", QoS::AtLeastOnce, &mut config))
            .unwrap();

        let mut client = FakeClient::default();
        client.inbound.extend([
            ("/titanium/A1B2C3D4E5F6/config".to_string(), b"{oops".to_vec()),
            ("/titanium/A1B2C3D4E5F6/config".to_string(), b"4".to_vec()),
        ]);
        let mut bridge = Bridge::new(client, &table, options);
        assert!(block_on(bridge.poll_link(&hub)));
        block_on(bridge.service_inbound(Instant::now() + Duration::from_millis(50)));

        assert!(bridge.client().inbound.is_empty());
        assert_eq!(
            block_on(table.receive(config, Duration::from_millis(1))),
            Ok(Some(4))
        );
        assert_eq!(
            block_on(table.receive(config, Duration::from_millis(1))),
            Ok(None)
        );
    }
}
