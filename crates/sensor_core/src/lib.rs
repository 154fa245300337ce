//! # Sensor Core
//!
//! Núcleo de streaming de telemetria de sensores (acelerômetro, giroscópio,
//! proximidade, luz) para um servidor WebSocket.
//!
//! ## Módulos
//! - [`types`] – Amostra agregada e canais de sensor
//! - [`rate_limiter`] – Teto de frequência de envio
//! - [`protocol`] – Frames JSON (perfis Minimal/Full)
//! - [`connection`] – Máquina de estados da conexão de saída
//! - [`feed`] – Assinatura de fontes de sensores
//! - [`session`] – Sessão liga/desliga que compõe tudo acima
//! - [`config`] – Configuração unificada via TOML

pub mod config;
pub mod connection;
pub mod feed;
pub mod protocol;
pub mod rate_limiter;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports convenientes
pub use config::{AppConfig, Endpoint, ReceiverConfig, SenderConfig};
pub use connection::{ConnectionManager, ConnectionState, Transport, TransportEvent, TransportFactory};
pub use protocol::{ProtocolProfile, StreamFrame, decode_frame, encode_frame};
pub use session::{SessionCommand, SessionNotice, SessionSettings, SessionState, TelemetrySession};
pub use types::{Sample, SensorKind};
