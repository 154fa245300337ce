//! # Sensor Sender
//!
//! Lê os sensores de movimento/ambiente (acelerômetro, giroscópio,
//! proximidade, luz) e, com o streaming ligado, envia frames JSON para um
//! servidor WebSocket.
//!
//! ## Uso
//! ```bash
//! sensor_sender            # Streaming desligado; digite "on" para ligar
//! sensor_sender --start    # Liga o streaming na inicialização
//! ```

mod control;
mod simulated_feed;
mod ws_transport;

use crossbeam_channel::unbounded;
use sensor_core::config::AppConfig;
use sensor_core::session::{SessionCommand, SessionSettings, SystemClock, TelemetrySession};
use simulated_feed::SimulatedFeed;
use std::time::Duration;
use tracing::{error, warn};
use ws_transport::WsTransportFactory;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(300);

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let autostart = std::env::args().any(|a| a == "--start");

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        std::process::exit(2);
    }

    let sender_cfg = &config.sender;
    let settings = SessionSettings::from(sender_cfg);

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📡 SENSOR SENDER");
    println!("══════════════════════════════════════════════");
    println!("  Destino:    {}", sender_cfg.endpoint_url);
    println!(
        "  Intervalo:  {} ms (teto {} Hz)",
        sender_cfg.send_interval_millis,
        1000 / sender_cfg.send_interval_millis.max(1)
    );
    println!("  Amostragem: {} µs", sender_cfg.sensor_delay_micros);
    println!("  Protocolo:  {:?}", sender_cfg.profile);
    println!("  Label:      {}", sender_cfg.label);
    println!("══════════════════════════════════════════════");
    println!("{}", control::HELP);
    println!();

    // ── Controle ──
    let (cmd_tx, cmd_rx) = unbounded();
    let (notice_tx, notice_rx) = unbounded();
    control::spawn_stdin_reader(cmd_tx.clone());
    control::spawn_notice_printer(notice_rx);

    if autostart {
        let _ = cmd_tx.send(SessionCommand::Enable);
    }

    // ── Sessão ──
    let mut session = TelemetrySession::new(
        settings,
        WsTransportFactory,
        SystemClock::new(),
        SimulatedFeed,
    )
    .with_notices(notice_tx);

    session.run(cmd_rx);

    // Dá tempo para o close frame sair antes do processo terminar
    std::thread::sleep(SHUTDOWN_GRACE);
}
