//! Fonte de sensores simulada.
//!
//! Substitui o hardware do telefone: gera acelerômetro e giroscópio a cada
//! período de amostragem e proximidade/luz em ritmo mais lento, como um
//! aparelho parado na mão com leve oscilação.

use crossbeam_channel::Sender;
use sensor_core::feed::{SensorEvent, SensorFeed, Subscription, SubscriptionFlag};
use sensor_core::types::SensorKind;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// A cada quantos ticks sai uma leitura de luz.
const LIGHT_EVERY: u64 = 10;
/// A cada quantos ticks sai uma leitura de proximidade.
const PROXIMITY_EVERY: u64 = 50;

/// Gravidade padrão (m/s²).
const GRAVITY: f32 = 9.806_65;

#[derive(Debug, Default)]
pub struct SimulatedFeed;

impl SensorFeed for SimulatedFeed {
    fn subscribe(&mut self, sink: Sender<SensorEvent>, sampling_period: Duration) -> Subscription {
        let (subscription, flag) = Subscription::new();

        let spawned = std::thread::Builder::new()
            .name("sensor-feed".into())
            .spawn(move || feed_loop(&flag, &sink, sampling_period));
        if let Err(e) = spawned {
            error!("Falha ao criar thread de sensores: {e}");
        }

        subscription
    }
}

fn feed_loop(flag: &SubscriptionFlag, sink: &Sender<SensorEvent>, period: Duration) {
    let start = Instant::now();
    let mut tick: u64 = 0;
    debug!("Fonte simulada ativa ({} µs)", period.as_micros());

    while flag.is_active() {
        let t = start.elapsed().as_secs_f32();
        for event in readings(tick, t) {
            if sink.send(event).is_err() {
                return;
            }
        }
        tick += 1;
        std::thread::sleep(period);
    }

    debug!("Fonte simulada encerrada após {tick} ticks");
}

/// Leituras do tick `tick` no instante `t` (s).
fn readings(tick: u64, t: f32) -> Vec<SensorEvent> {
    let mut events = vec![
        SensorEvent::new(
            SensorKind::Accelerometer,
            &[
                0.3 * (TAU * 1.5 * t).sin(),
                0.2 * (TAU * 1.5 * t).cos(),
                GRAVITY + 0.5 * (TAU * 3.0 * t).sin(),
            ],
        ),
        SensorEvent::new(
            SensorKind::Gyroscope,
            &[0.1 * t.sin(), 0.05 * (2.0 * t).cos(), 0.02 * (3.0 * t).sin()],
        ),
    ];

    if tick % LIGHT_EVERY == 0 {
        events.push(SensorEvent::new(
            SensorKind::Light,
            &[300.0 + 50.0 * (0.2 * t).sin()],
        ));
    }
    if tick % PROXIMITY_EVERY == 0 {
        // Alterna perto/longe
        let near = (tick / PROXIMITY_EVERY) % 2 == 1;
        events.push(SensorEvent::new(
            SensorKind::Proximity,
            &[if near { 0.0 } else { 5.0 }],
        ));
    }

    events
}
