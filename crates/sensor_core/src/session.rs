//! Sessão de telemetria: une fonte de sensores, limitador, encoder e
//! conexão numa unidade liga/desliga.
//!
//! Toda mutação de estado acontece na thread que consome a sessão. Eventos
//! de sensor e de transporte chegam por channels e são processados em ordem
//! por [`TelemetrySession::pump`] ou pelo loop [`TelemetrySession::run`].

use crate::config::SenderConfig;
use crate::connection::{
    ConnectionManager, ConnectionSignal, ConnectionState, ConnectionStats, TransportEvent,
    TransportFactory,
};
use crate::feed::{SensorEvent, SensorFeed, Subscription};
use crate::protocol::{
    ProtocolError, ProtocolProfile, REASON_APP_DISCONNECTED, REASON_SESSION_STOPPED, encode_frame,
    validate_label,
};
use crate::rate_limiter::RateLimiter;
use crate::types::{Sample, SensorKind};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Intervalo do tick usado para checar o timeout de conexão.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

// ──────────────────────────────────────────────
// Relógio
// ──────────────────────────────────────────────

/// Fonte de tempo em milissegundos.
///
/// O limitador e o timeout de conexão usam só `monotonic_millis`; o relógio
/// de parede serve apenas para carimbar os frames.
pub trait Clock {
    /// Tempo monotônico (nunca volta), origem arbitrária.
    fn monotonic_millis(&self) -> u64;

    /// Relógio de parede (ms desde a época Unix).
    fn wall_millis(&self) -> u64;
}

/// Relógio do sistema: `Instant` para o monotônico, `SystemTime` para a parede.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn wall_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

// ──────────────────────────────────────────────
// Tipos públicos
// ──────────────────────────────────────────────

/// Erros ao controlar a sessão.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Label desconhecida: {0} (disponíveis: {1:?})")]
    UnknownLabel(String, Vec<String>),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Estado da sessão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}

/// Comandos da superfície de controle (o "switch" e o seletor de label).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Enable,
    Disable,
    SetLabel(String),
    Status,
    Shutdown,
}

/// Retrato da sessão para exibição.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub connection: ConnectionState,
    pub stats: ConnectionStats,
    pub label: String,
    pub sample: Sample,
}

/// Avisos enviados para a superfície de controle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    ConnectionOpened,
    /// O streaming foi desligado pelo transporte; o "switch" deve refletir
    StreamingDisabled { reason: String },
    LabelChanged(String),
    Status(SessionStatus),
}

/// Parâmetros de uma sessão.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub endpoint_url: String,
    pub send_interval_millis: u64,
    pub sampling_period: Duration,
    pub connect_timeout: Option<Duration>,
    pub profile: ProtocolProfile,
    pub label: String,
    /// Labels aceitas em `set_label` (vazio = qualquer texto)
    pub labels: Vec<String>,
}

impl From<&SenderConfig> for SessionSettings {
    fn from(cfg: &SenderConfig) -> Self {
        Self {
            endpoint_url: cfg.endpoint_url.clone(),
            send_interval_millis: cfg.send_interval_millis,
            sampling_period: Duration::from_micros(cfg.sensor_delay_micros),
            connect_timeout: cfg.connect_timeout_millis.map(Duration::from_millis),
            profile: cfg.profile,
            label: cfg.label.clone(),
            labels: cfg.labels.clone(),
        }
    }
}

// ──────────────────────────────────────────────
// Sessão
// ──────────────────────────────────────────────

/// Raiz de composição do streaming.
pub struct TelemetrySession<T: TransportFactory, C: Clock, F: SensorFeed> {
    settings: SessionSettings,
    state: SessionState,
    sample: Sample,
    label: String,
    limiter: RateLimiter,
    connection: ConnectionManager<T>,
    clock: C,
    feed: F,
    subscription: Option<Subscription>,
    sensor_tx: Sender<SensorEvent>,
    sensor_rx: Receiver<SensorEvent>,
    transport_rx: Receiver<TransportEvent>,
    notices: Option<Sender<SessionNotice>>,
}

impl<T: TransportFactory, C: Clock, F: SensorFeed> TelemetrySession<T, C, F> {
    pub fn new(settings: SessionSettings, factory: T, clock: C, feed: F) -> Self {
        let (transport_tx, transport_rx) = unbounded();
        let (sensor_tx, sensor_rx) = unbounded();

        Self {
            state: SessionState::Stopped,
            sample: Sample::default(),
            label: settings.label.clone(),
            limiter: RateLimiter::new(settings.send_interval_millis),
            connection: ConnectionManager::new(factory, transport_tx, settings.connect_timeout),
            clock,
            feed,
            subscription: None,
            sensor_tx,
            sensor_rx,
            transport_rx,
            notices: None,
            settings,
        }
    }

    /// Canal para avisos à superfície de controle.
    pub fn with_notices(mut self, notices: Sender<SessionNotice>) -> Self {
        self.notices = Some(notices);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.connection.stats()
    }

    /// Valores mais recentes, atualizados mesmo quando o envio é limitado.
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            connection: self.connection.state(),
            stats: self.connection.stats(),
            label: self.label.clone(),
            sample: self.sample,
        }
    }

    /// Liga o streaming para `url`.
    pub fn start(&mut self, url: &str) {
        if self.state == SessionState::Running {
            debug!("Sessão já está ativa");
            return;
        }

        self.state = SessionState::Running;
        self.limiter.reset();
        self.connection.connect(url, self.clock.monotonic_millis());
        self.subscription = Some(
            self.feed
                .subscribe(self.sensor_tx.clone(), self.settings.sampling_period),
        );
        info!("Streaming ON → {url}");
    }

    /// Desliga o streaming.
    pub fn stop(&mut self) {
        self.stop_with(REASON_SESSION_STOPPED);
    }

    /// Sinal externo de controle (o "switch").
    pub fn set_streaming(&mut self, enabled: bool) {
        if enabled {
            let url = self.settings.endpoint_url.clone();
            self.start(&url);
        } else {
            self.stop();
        }
    }

    /// Troca a label dos próximos frames.
    pub fn set_label(&mut self, label: &str) -> Result<(), SessionError> {
        validate_label(label)?;
        if !self.settings.labels.is_empty() && !self.settings.labels.iter().any(|l| l == label) {
            return Err(SessionError::UnknownLabel(
                label.to_owned(),
                self.settings.labels.clone(),
            ));
        }
        self.label = label.to_owned();
        info!("Label: {label}");
        self.notify(SessionNotice::LabelChanged(self.label.clone()));
        Ok(())
    }

    /// Callback da fonte de sensores.
    pub fn on_sample(&mut self, kind: SensorKind, values: &[f32]) {
        let wall = self.clock.wall_millis();
        self.sample.update_channel(kind, values);
        self.sample.stamp(wall);

        if self.state != SessionState::Running
            || !self.limiter.should_send(self.clock.monotonic_millis())
        {
            return;
        }

        match encode_frame(&self.sample, &self.label, wall as i64, self.settings.profile) {
            Ok(frame) => {
                self.connection.send(frame);
            }
            Err(e) => warn!("Frame descartado: {e}"),
        }
    }

    /// Aplica um evento de conclusão do transporte.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if let Some(signal) = self.connection.handle_event(event) {
            self.on_signal(signal);
        }
    }

    /// Checagens periódicas (timeout de conexão).
    pub fn tick(&mut self) {
        if let Some(signal) = self.connection.check_timeout(self.clock.monotonic_millis()) {
            self.on_signal(signal);
        }
    }

    /// Processa tudo que estiver pendente nas filas, sem bloquear.
    /// Retorna quantos eventos foram tratados.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;

        let transport_rx = self.transport_rx.clone();
        for event in transport_rx.try_iter() {
            self.handle_transport_event(event);
            handled += 1;
        }

        let sensor_rx = self.sensor_rx.clone();
        for event in sensor_rx.try_iter() {
            self.on_sample(event.kind, &event.values);
            handled += 1;
        }

        self.tick();
        handled
    }

    /// Aplica um comando da superfície de controle.
    pub fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Enable => self.set_streaming(true),
            SessionCommand::Disable => self.set_streaming(false),
            SessionCommand::SetLabel(label) => {
                if let Err(e) = self.set_label(&label) {
                    warn!("{e}");
                }
            }
            SessionCommand::Status => self.notify(SessionNotice::Status(self.status())),
            SessionCommand::Shutdown => self.shutdown(),
        }
    }

    /// Loop da sessão: consome comandos, eventos de transporte e eventos de
    /// sensor numa única thread até `Shutdown` (ou o fim do canal de comandos).
    pub fn run(&mut self, commands: Receiver<SessionCommand>) {
        let transport_rx = self.transport_rx.clone();
        let sensor_rx = self.sensor_rx.clone();
        let ticker = crossbeam_channel::tick(TICK_INTERVAL);

        loop {
            select! {
                recv(commands) -> cmd => match cmd {
                    Ok(SessionCommand::Shutdown) | Err(_) => break,
                    Ok(cmd) => self.apply(cmd),
                },
                recv(transport_rx) -> event => {
                    if let Ok(event) = event {
                        self.handle_transport_event(event);
                    }
                },
                recv(sensor_rx) -> event => {
                    if let Ok(event) = event {
                        self.on_sample(event.kind, &event.values);
                    }
                },
                recv(ticker) -> _ => self.tick(),
            }
        }

        self.shutdown();
    }

    /// Encerra tudo com o motivo de saída do aplicativo.
    pub fn shutdown(&mut self) {
        self.stop_with(REASON_APP_DISCONNECTED);
        info!(
            "Sessão encerrada | enviados {} | descartados {}",
            self.connection.stats().frames_sent,
            self.connection.stats().frames_dropped
        );
    }

    fn stop_with(&mut self, reason: &str) {
        if self.state == SessionState::Stopped {
            debug!("Sessão já está parada");
            return;
        }

        self.state = SessionState::Stopped;
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.connection.close(reason);
        info!("Streaming OFF");
    }

    fn on_signal(&mut self, signal: ConnectionSignal) {
        match signal {
            ConnectionSignal::Opened => self.notify(SessionNotice::ConnectionOpened),
            ConnectionSignal::Failed(error) => {
                self.stop();
                self.notify(SessionNotice::StreamingDisabled {
                    reason: error.to_string(),
                });
            }
            ConnectionSignal::Closed { code, reason } => {
                self.stop();
                self.notify(SessionNotice::StreamingDisabled {
                    reason: format!("servidor encerrou ({code} / {reason})"),
                });
            }
        }
    }

    fn notify(&self, notice: SessionNotice) {
        if let Some(tx) = &self.notices {
            if tx.send(notice).is_err() {
                debug!("Superfície de controle desconectada");
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
