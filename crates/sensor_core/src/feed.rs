//! Contrato de assinatura de uma fonte de sensores.
//!
//! A fonte entrega eventos por um channel; quem consome é a thread da
//! sessão, nunca a thread da fonte.

use crate::types::SensorKind;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Um evento de sensor: canal + valores brutos.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    pub kind: SensorKind,
    pub values: Vec<f32>,
}

impl SensorEvent {
    pub fn new(kind: SensorKind, values: &[f32]) -> Self {
        Self {
            kind,
            values: values.to_vec(),
        }
    }
}

/// Fonte de eventos de sensor.
pub trait SensorFeed {
    /// Começa a entregar eventos em `sink` com o período de amostragem pedido.
    fn subscribe(&mut self, sink: Sender<SensorEvent>, sampling_period: Duration) -> Subscription;
}

/// Assinatura ativa. Cancelar (ou dropar) interrompe a entrega.
#[derive(Debug)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Cria a assinatura e devolve o flag que a fonte deve consultar.
    pub fn new() -> (Self, SubscriptionFlag) {
        let active = Arc::new(AtomicBool::new(true));
        (
            Self {
                active: Arc::clone(&active),
            },
            SubscriptionFlag { active },
        )
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn cancel(self) {
        // Drop faz o trabalho
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Lado da fonte: indica se ainda deve entregar eventos.
#[derive(Debug, Clone)]
pub struct SubscriptionFlag {
    active: Arc<AtomicBool>,
}

impl SubscriptionFlag {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
