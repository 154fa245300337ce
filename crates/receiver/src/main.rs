//! # Sensor Receiver
//!
//! Servidor WebSocket que recebe os frames de sensores enviados pelo
//! Sender, decodifica e registra no log.
//!
//! Emulador Android: o aplicativo conecta em `ws://10.0.2.2:8080`.
//! Aparelho físico: use o IP da máquina na rede local.

mod console;
mod net_thread;

use net_thread::NetEvent;
use sensor_core::config::AppConfig;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Intervalo do resumo de taxa no log.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(10);

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        let _ = config.save(&config_path);
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        std::process::exit(2);
    }

    let receiver_cfg = &config.receiver;
    info!(
        "Iniciando servidor WebSocket em ws://{}:{}",
        receiver_cfg.bind_ip, receiver_cfg.port
    );

    let rx = net_thread::spawn_server_thread(
        receiver_cfg.bind_ip.clone(),
        receiver_cfg.port,
        receiver_cfg.queue_capacity,
    );

    let mut frames: u64 = 0;
    let mut bytes: u64 = 0;
    let mut window_start = Instant::now();

    // ── Loop principal ──
    for event in rx {
        match event {
            NetEvent::Connected(addr) => info!("Cliente conectado de {}", addr.ip()),
            NetEvent::Frame(msg) => {
                frames += 1;
                bytes += msg.raw_size as u64;
                debug!("Frame de {} ({} bytes)", msg.source_addr, msg.raw_size);
                for line in console::frame_lines(&msg.frame) {
                    info!("{line}");
                }
            }
            NetEvent::Invalid {
                source_addr,
                raw,
                error,
            } => warn!("Mensagem inválida de {source_addr}: {raw} ({error})"),
            NetEvent::Disconnected {
                source_addr,
                graceful,
                detail,
            } => {
                if graceful {
                    info!("Cliente {source_addr} desconectou normalmente");
                } else {
                    error!("Cliente {source_addr} desconectou com erro: {detail}");
                }
            }
        }

        let elapsed = window_start.elapsed();
        if elapsed >= SUMMARY_INTERVAL {
            info!(
                "Resumo: {frames} frames ({:.1} Hz, {bytes} bytes) nos últimos {:.0}s",
                frames as f64 / elapsed.as_secs_f64(),
                elapsed.as_secs_f64()
            );
            frames = 0;
            bytes = 0;
            window_start = Instant::now();
        }
    }
}
