//! Gerenciador da conexão de saída.
//!
//! Mantém no máximo uma conexão lógica com o endpoint configurado. As
//! operações de transporte retornam imediatamente; a conclusão (aberta,
//! falha, fechada) chega como [`TransportEvent`] numa fila única e
//! ordenada, consumida pela thread da sessão via [`ConnectionManager::handle_event`].
//!
//! ```text
//! Idle ──connect──► Connecting ──Opened──► Open ──close──► Closing ─► Closed
//!                        │                   │
//!                        └──────Failed───────┴──────────► Failed
//! ```

use crate::protocol::CLOSE_NORMAL;
use crossbeam_channel::Sender;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Erros de transporte.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Endpoint inválido: {0}")]
    InvalidEndpoint(String),

    #[error("Falha ao conectar: {0}")]
    Connect(String),

    #[error("Timeout de conexão após {0} ms")]
    ConnectTimeout(u64),

    #[error("Conexão perdida: {0}")]
    Io(String),

    #[error("Transporte encerrado")]
    Closed,
}

/// Estado da conexão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Estados a partir dos quais `connect` inicia uma nova tentativa.
    pub fn accepts_connect(self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

/// Evento de conclusão emitido pelo transporte (em qualquer thread).
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened { conn_id: u64 },
    Failed { conn_id: u64, error: TransportError },
    Closed { conn_id: u64, code: u16, reason: String },
    Message { conn_id: u64, text: String },
}

impl TransportEvent {
    pub fn conn_id(&self) -> u64 {
        match self {
            TransportEvent::Opened { conn_id }
            | TransportEvent::Failed { conn_id, .. }
            | TransportEvent::Closed { conn_id, .. }
            | TransportEvent::Message { conn_id, .. } => *conn_id,
        }
    }
}

/// Handle de uma conexão viva. Nenhum método pode bloquear.
pub trait Transport {
    /// Enfileira um frame de texto para envio.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Pede o fechamento e libera o recurso.
    fn close(&mut self, code: u16, reason: &str);
}

/// Cria conexões. `connect` retorna na hora; o resultado chega em `events`.
pub trait TransportFactory {
    type Transport: Transport;

    fn connect(
        &mut self,
        url: &str,
        conn_id: u64,
        connect_timeout: Option<Duration>,
        events: Sender<TransportEvent>,
    ) -> Self::Transport;
}

/// Sinal propagado para a sessão dona da conexão.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionSignal {
    /// Conexão aberta
    Opened,
    /// Falha de transporte: o streaming deve ser desligado
    Failed(TransportError),
    /// Servidor encerrou a conexão
    Closed { code: u16, reason: String },
}

/// Contadores de uso.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub attempts: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

/// Dono exclusivo da conexão de saída.
pub struct ConnectionManager<F: TransportFactory> {
    factory: F,
    events: Sender<TransportEvent>,
    state: ConnectionState,
    handle: Option<F::Transport>,
    /// Id da tentativa atual; eventos com outro id são obsoletos
    conn_id: u64,
    connect_timeout: Option<Duration>,
    connect_started_at: Option<u64>,
    stats: ConnectionStats,
}

impl<F: TransportFactory> ConnectionManager<F> {
    pub fn new(factory: F, events: Sender<TransportEvent>, connect_timeout: Option<Duration>) -> Self {
        Self {
            factory,
            events,
            state: ConnectionState::Idle,
            handle: None,
            conn_id: 0,
            connect_timeout,
            connect_started_at: None,
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Inicia uma tentativa de conexão. Retorna `false` (no-op) se já existe
    /// uma tentativa ou conexão em andamento.
    pub fn connect(&mut self, url: &str, now_millis: u64) -> bool {
        if !self.state.accepts_connect() {
            debug!("Conexão já ativa ou em andamento ({:?}), ignorando connect", self.state);
            return false;
        }

        self.conn_id += 1;
        self.stats.attempts += 1;
        self.state = ConnectionState::Connecting;
        self.connect_started_at = Some(now_millis);
        info!("Conectando a {url} (tentativa #{})", self.conn_id);

        let handle = self
            .factory
            .connect(url, self.conn_id, self.connect_timeout, self.events.clone());
        self.handle = Some(handle);
        true
    }

    /// Envia um frame se a conexão estiver aberta; caso contrário descarta
    /// em silêncio. Sem fila, sem retry.
    pub fn send(&mut self, bytes: Vec<u8>) -> bool {
        if self.state != ConnectionState::Open {
            self.stats.frames_dropped += 1;
            return false;
        }
        let Some(handle) = self.handle.as_mut() else {
            self.stats.frames_dropped += 1;
            return false;
        };

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Frame não é UTF-8, descartando: {e}");
                self.stats.frames_dropped += 1;
                return false;
            }
        };

        match handle.send_text(text) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                true
            }
            Err(e) => {
                // A falha em si chega pela fila de eventos
                debug!("Envio descartado: {e}");
                self.stats.frames_dropped += 1;
                false
            }
        }
    }

    /// Fecha a conexão com código 1000. Idempotente: o transporte é liberado
    /// exatamente uma vez.
    pub fn close(&mut self, reason: &str) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::Closing;
                if let Some(mut handle) = self.handle.take() {
                    handle.close(CLOSE_NORMAL, reason);
                }
                self.connect_started_at = None;
                self.state = ConnectionState::Closed;
                info!("Conexão fechada: {CLOSE_NORMAL} / {reason}");
            }
            state => {
                debug!("close ignorado no estado {state:?}");
            }
        }
    }

    /// Aplica um evento de conclusão do transporte.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<ConnectionSignal> {
        if event.conn_id() != self.conn_id {
            debug!("Evento obsoleto da tentativa #{} ignorado", event.conn_id());
            return None;
        }

        match event {
            TransportEvent::Opened { .. } => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                self.state = ConnectionState::Open;
                self.connect_started_at = None;
                info!("Conexão aberta (tentativa #{})", self.conn_id);
                Some(ConnectionSignal::Opened)
            }
            TransportEvent::Failed { error, .. } => {
                if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
                    return None;
                }
                warn!("Erro de conexão: {error}");
                self.fail();
                Some(ConnectionSignal::Failed(error))
            }
            TransportEvent::Closed { code, reason, .. } => {
                if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
                    return None;
                }
                info!("Servidor encerrou a conexão: {code} / {reason}");
                self.handle = None;
                self.connect_started_at = None;
                self.state = ConnectionState::Closed;
                Some(ConnectionSignal::Closed { code, reason })
            }
            TransportEvent::Message { text, .. } => {
                debug!("Recebido: {text}");
                None
            }
        }
    }

    /// Falha uma tentativa presa em `Connecting` além do timeout configurado.
    pub fn check_timeout(&mut self, now_millis: u64) -> Option<ConnectionSignal> {
        let timeout = self.connect_timeout?;
        let started = self.connect_started_at?;
        if self.state != ConnectionState::Connecting {
            return None;
        }

        let timeout_ms = timeout.as_millis() as u64;
        if now_millis.saturating_sub(started) < timeout_ms {
            return None;
        }

        warn!("Timeout de conexão após {timeout_ms} ms");
        if let Some(mut handle) = self.handle.take() {
            handle.close(CLOSE_NORMAL, "connect timeout");
        }
        self.fail();
        Some(ConnectionSignal::Failed(TransportError::ConnectTimeout(timeout_ms)))
    }

    fn fail(&mut self) {
        self.handle = None;
        self.connect_started_at = None;
        self.state = ConnectionState::Failed;
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
