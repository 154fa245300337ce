//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável serve o sender e o receiver.

use crate::protocol::ProtocolProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Erros de configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("URL sem esquema ws:// ou wss://: {0}")]
    UnsupportedScheme(String),

    #[error("URL sem host: {0}")]
    MissingHost(String),

    #[error("Porta inválida em {0}")]
    InvalidPort(String),

    #[error("Erro ao serializar config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro de I/O em {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Endpoint WebSocket já decomposto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Caminho + query (sempre começa com `/`)
    pub path: String,
}

impl Endpoint {
    /// Decompõe `ws://host[:porta][/caminho]` ou `wss://…`.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let (secure, rest) = if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else {
            return Err(ConfigError::UnsupportedScheme(url.to_owned()));
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        // IPv6 entre colchetes: [::1]:8080
        let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
            let end = v6
                .find(']')
                .ok_or_else(|| ConfigError::MissingHost(url.to_owned()))?;
            let port = v6[end + 1..].strip_prefix(':');
            (&v6[..end], port)
        } else {
            match authority.rsplit_once(':') {
                Some((h, p)) => (h, Some(p)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(ConfigError::MissingHost(url.to_owned()));
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ConfigError::InvalidPort(url.to_owned()))?,
            None if secure => 443,
            None => 80,
        };

        Ok(Self {
            secure,
            host: host.to_owned(),
            port,
            path: path.to_owned(),
        })
    }

    /// `host:porta` pronto para resolução.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Configuração do Sender (cliente de streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Servidor de destino.
    /// Emulador Android: `ws://10.0.2.2:8080`; rede local: `ws://<ip>:8080`
    pub endpoint_url: String,
    /// Intervalo mínimo entre frames (ms). 5 = teto de 200 Hz
    pub send_interval_millis: u64,
    /// Período de amostragem pedido à fonte (µs). 20000 = SENSOR_DELAY_GAME
    pub sensor_delay_micros: u64,
    /// Timeout de conexão (ms). Ausente = sem timeout
    pub connect_timeout_millis: Option<u64>,
    /// Variante do protocolo: "full" ou "minimal"
    pub profile: ProtocolProfile,
    /// Label inicial
    pub label: String,
    /// Labels disponíveis para seleção
    pub labels: Vec<String>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "ws://10.0.2.2:8080".into(),
            send_interval_millis: 5,
            sensor_delay_micros: 20_000,
            connect_timeout_millis: None,
            profile: ProtocolProfile::Full,
            label: "idle".into(),
            labels: ["idle", "walking", "running", "sitting", "standing"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Configuração do Receiver (servidor de ingestão).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// IP para bind (0.0.0.0 = todas as interfaces)
    pub bind_ip: String,
    /// Porta TCP do WebSocket
    pub port: u16,
    /// Capacidade do channel entre threads de rede e o log
    pub queue_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            port: 8080,
            queue_capacity: 1024,
        }
    }
}

/// Configuração raiz do aplicativo (unifica sender e receiver).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = Endpoint::parse(&self.sender.endpoint_url) {
            errors.push(e.to_string());
        }
        if self.sender.sensor_delay_micros == 0 {
            errors.push("Período de amostragem não pode ser 0".into());
        }
        if self.sender.connect_timeout_millis == Some(0) {
            errors.push("Timeout de conexão não pode ser 0 (omita para desativar)".into());
        }
        if let Err(e) = crate::protocol::validate_label(&self.sender.label) {
            errors.push(e.to_string());
        } else if !self.sender.labels.is_empty() && !self.sender.labels.contains(&self.sender.label) {
            errors.push(format!(
                "Label inicial {:?} não está em {:?}",
                self.sender.label, self.sender.labels
            ));
        }
        if self.receiver.port == 0 {
            errors.push("Porta do receiver não pode ser 0".into());
        }
        if self.receiver.queue_capacity == 0 {
            errors.push("Capacidade da fila do receiver não pode ser 0".into());
        }

        errors
    }
}
