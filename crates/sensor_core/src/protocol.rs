//! Protocolo de frames (cliente → servidor).
//!
//! Um frame por envio, texto UTF-8 JSON sobre uma conexão WebSocket
//! persistente:
//!
//! ```text
//! {
//!   "timestamp": <i64 ms>,
//!   "accelerometer": {"x": f32, "y": f32, "z": f32},
//!   "gyroscope": {"gx": f32, "gy": f32, "gz": f32},   // só Full
//!   "proximity": f32,                                  // só Full
//!   "light": f32,                                      // só Full
//!   "label": "..."                                     // só Full
//! }
//! ```
//!
//! Os floats saem com a representação nativa de `f32`, sem arredondamento.

use crate::types::{Accel, Gyro, NO_READING, Sample};
use serde::{Deserialize, Serialize};

/// Código de fechamento normal (RFC 6455).
pub const CLOSE_NORMAL: u16 = 1000;

/// Motivo enviado quando o aplicativo encerra.
pub const REASON_APP_DISCONNECTED: &str = "App disconnected";

/// Motivo enviado quando a sessão é desligada.
pub const REASON_SESSION_STOPPED: &str = "session stopped";

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Label não representável como texto: {0:?}")]
    InvalidLabel(String),

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// Variante do protocolo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolProfile {
    /// Apenas timestamp + acelerômetro
    Minimal,
    /// Todos os canais + label
    #[default]
    Full,
}

/// Frame transiente, montado só no momento do envio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub timestamp: i64,
    pub accelerometer: Accel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyroscope: Option<Gyro>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proximity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl StreamFrame {
    /// Monta o frame a partir do estado agregado atual.
    ///
    /// Leituras não finitas (NaN, ±∞) viram o sentinela [`NO_READING`]: o JSON
    /// não as representa e `serde_json` as escreveria como `null`.
    pub fn build(sample: &Sample, label: &str, timestamp: i64, profile: ProtocolProfile) -> Self {
        let accel = Accel {
            x: finite_or_sentinel(sample.accel.x),
            y: finite_or_sentinel(sample.accel.y),
            z: finite_or_sentinel(sample.accel.z),
        };
        match profile {
            ProtocolProfile::Minimal => Self {
                timestamp,
                accelerometer: accel,
                gyroscope: None,
                proximity: None,
                light: None,
                label: None,
            },
            ProtocolProfile::Full => Self {
                timestamp,
                accelerometer: accel,
                gyroscope: Some(Gyro {
                    gx: finite_or_sentinel(sample.gyro.gx),
                    gy: finite_or_sentinel(sample.gyro.gy),
                    gz: finite_or_sentinel(sample.gyro.gz),
                }),
                proximity: Some(finite_or_sentinel(sample.proximity)),
                light: Some(finite_or_sentinel(sample.light)),
                label: Some(label.to_owned()),
            },
        }
    }

    /// Variante detectada pela presença dos campos estendidos.
    pub fn profile(&self) -> ProtocolProfile {
        if self.gyroscope.is_some()
            || self.proximity.is_some()
            || self.light.is_some()
            || self.label.is_some()
        {
            ProtocolProfile::Full
        } else {
            ProtocolProfile::Minimal
        }
    }
}

fn finite_or_sentinel(value: f32) -> f32 {
    if value.is_finite() { value } else { NO_READING }
}

/// Label precisa ser texto simples: não vazio e sem caracteres de controle.
pub fn validate_label(label: &str) -> Result<(), ProtocolError> {
    if label.is_empty() || label.chars().any(char::is_control) {
        return Err(ProtocolError::InvalidLabel(label.to_owned()));
    }
    Ok(())
}

/// Codifica a amostra atual + label em um frame JSON.
///
/// No perfil `Minimal` a label não é transmitida e portanto não é validada.
pub fn encode_frame(
    sample: &Sample,
    label: &str,
    timestamp: i64,
    profile: ProtocolProfile,
) -> Result<Vec<u8>, ProtocolError> {
    if profile == ProtocolProfile::Full {
        validate_label(label)?;
    }
    let frame = StreamFrame::build(sample, label, timestamp, profile);
    serde_json::to_vec(&frame).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Decodifica um frame recebido (qualquer variante).
pub fn decode_frame(data: &[u8]) -> Result<StreamFrame, ProtocolError> {
    serde_json::from_slice(data).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
