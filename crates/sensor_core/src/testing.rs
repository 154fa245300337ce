//! Dublês de teste: transporte que grava chamadas, relógio manual e fonte
//! de sensores manual.

use crate::connection::{Transport, TransportError, TransportEvent, TransportFactory};
use crate::feed::{SensorEvent, SensorFeed, Subscription, SubscriptionFlag};
use crate::session::Clock;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect { url: String },
    Send { text: String },
    Close { code: u16, reason: String },
}

/// Como o transporte falso responde a `connect`.
#[derive(Debug, Clone, Default)]
pub enum ConnectBehavior {
    /// Nenhum evento (conexão pendurada)
    #[default]
    Silent,
    /// Emite `Opened` na hora
    Open,
    /// Emite `Failed` na hora
    Fail(TransportError),
}

#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    calls: Arc<Mutex<Vec<TransportCall>>>,
    behavior: Arc<Mutex<ConnectBehavior>>,
}

impl FakeFactory {
    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        let factory = Self::default();
        factory.set_behavior(behavior);
        factory
    }

    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Connect { url } => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Send { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Close { .. }))
            .count()
    }
}

pub struct FakeTransport {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl Transport for FakeTransport {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(TransportCall::Send { text });
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.calls.lock().unwrap().push(TransportCall::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

impl TransportFactory for FakeFactory {
    type Transport = FakeTransport;

    fn connect(
        &mut self,
        url: &str,
        conn_id: u64,
        _connect_timeout: Option<Duration>,
        events: Sender<TransportEvent>,
    ) -> FakeTransport {
        self.calls
            .lock()
            .unwrap()
            .push(TransportCall::Connect { url: url.to_owned() });

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            ConnectBehavior::Silent => {}
            ConnectBehavior::Open => {
                let _ = events.send(TransportEvent::Opened { conn_id });
            }
            ConnectBehavior::Fail(error) => {
                let _ = events.send(TransportEvent::Failed { conn_id, error });
            }
        }

        FakeTransport {
            calls: Arc::clone(&self.calls),
        }
    }
}

/// Relógio controlado pelo teste. `advance` move os dois relógios juntos;
/// `set_wall` ajusta só o de parede (como um acerto de NTP).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    monotonic: Arc<AtomicU64>,
    wall: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn at(millis: u64) -> Self {
        let clock = Self::default();
        clock.monotonic.store(millis, Ordering::SeqCst);
        clock.set_wall(millis);
        clock
    }

    pub fn set_wall(&self, millis: u64) {
        self.wall.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.monotonic.fetch_add(millis, Ordering::SeqCst);
        self.wall.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn monotonic_millis(&self) -> u64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn wall_millis(&self) -> u64 {
        self.wall.load(Ordering::SeqCst)
    }
}

/// Fonte que só entrega o que o teste empurrar.
#[derive(Debug, Clone, Default)]
pub struct ManualFeed {
    inner: Arc<Mutex<ManualFeedInner>>,
}

#[derive(Debug, Default)]
struct ManualFeedInner {
    sink: Option<(Sender<SensorEvent>, SubscriptionFlag)>,
    subscriptions: usize,
    last_period: Option<Duration>,
}

impl ManualFeed {
    /// Entrega um evento se houver assinatura ativa.
    pub fn push(&self, event: SensorEvent) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.sink {
            Some((tx, flag)) if flag.is_active() => tx.send(event).is_ok(),
            _ => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.sink.as_ref().is_some_and(|(_, flag)| flag.is_active())
    }

    pub fn subscriptions(&self) -> usize {
        self.inner.lock().unwrap().subscriptions
    }

    pub fn last_period(&self) -> Option<Duration> {
        self.inner.lock().unwrap().last_period
    }
}

impl SensorFeed for ManualFeed {
    fn subscribe(&mut self, sink: Sender<SensorEvent>, sampling_period: Duration) -> Subscription {
        let (subscription, flag) = Subscription::new();
        let mut inner = self.inner.lock().unwrap();
        inner.sink = Some((sink, flag));
        inner.subscriptions += 1;
        inner.last_period = Some(sampling_period);
        subscription
    }
}
