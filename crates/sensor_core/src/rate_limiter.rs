//! Limitador de taxa de envio.
//!
//! Desacopla a frequência dos eventos de sensor (pode passar de 100 Hz) da
//! frequência de envio pela rede.

/// Libera no máximo um envio a cada `min_interval_millis`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval_millis: u64,
    /// `None` = nunca enviou (tratado como −∞)
    last_sent_at: Option<u64>,
}

impl RateLimiter {
    pub fn new(min_interval_millis: u64) -> Self {
        Self {
            min_interval_millis,
            last_sent_at: None,
        }
    }

    pub fn min_interval_millis(&self) -> u64 {
        self.min_interval_millis
    }

    pub fn last_sent_at(&self) -> Option<u64> {
        self.last_sent_at
    }

    /// Retorna `true` e registra `now` se o intervalo mínimo já passou.
    /// Caso contrário retorna `false` sem alterar o estado.
    pub fn should_send(&mut self, now_millis: u64) -> bool {
        let due = match self.last_sent_at {
            None => true,
            Some(last) => now_millis.saturating_sub(last) >= self.min_interval_millis,
        };
        if due {
            self.last_sent_at = Some(now_millis);
        }
        due
    }

    /// Volta ao estado inicial: o próximo `should_send` é liberado.
    pub fn reset(&mut self) {
        self.last_sent_at = None;
    }
}
