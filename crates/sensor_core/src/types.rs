//! Modelo de amostra dos sensores.
//!
//! Um único [`Sample`] agregado é atualizado in-place a cada evento de
//! sensor. Cada canal guarda o último valor recebido, então os campos de
//! uma amostra não foram necessariamente capturados no mesmo instante.

use serde::{Deserialize, Serialize};

/// Valor reservado para canais opcionais ainda sem leitura.
pub const NO_READING: f32 = -1.0;

// ──────────────────────────────────────────────
// Canais
// ──────────────────────────────────────────────

/// Fonte de dados de um sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Proximity,
    Light,
}

impl SensorKind {
    /// Todos os canais, na ordem em que aparecem no frame.
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Proximity,
        SensorKind::Light,
    ];

    /// Quantidade de valores que o sensor entrega por evento.
    pub fn arity(self) -> usize {
        match self {
            SensorKind::Accelerometer | SensorKind::Gyroscope => 3,
            SensorKind::Proximity | SensorKind::Light => 1,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Proximity => "proximity",
            SensorKind::Light => "light",
        };
        f.write_str(name)
    }
}

// ──────────────────────────────────────────────
// Acelerômetro / Giroscópio
// ──────────────────────────────────────────────

/// Aceleração nos três eixos (m/s²).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Accel {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Velocidade angular nos três eixos (rad/s).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Gyro {
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

// ──────────────────────────────────────────────
// Amostra agregada
// ──────────────────────────────────────────────

/// Último valor conhecido de cada canal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Instante (ms) do último evento aplicado
    pub timestamp_millis: u64,
    pub accel: Accel,
    pub gyro: Gyro,
    /// Distância (cm) ou [`NO_READING`]
    pub proximity: f32,
    /// Iluminância (lx) ou [`NO_READING`]
    pub light: f32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            timestamp_millis: 0,
            accel: Accel::default(),
            gyro: Gyro::default(),
            proximity: NO_READING,
            light: NO_READING,
        }
    }
}

impl Sample {
    /// Aplica os valores de um evento apenas aos campos do canal `kind`.
    ///
    /// Valores ausentes mantêm o campo anterior e valores excedentes são
    /// ignorados. Não há validação de faixa física.
    pub fn update_channel(&mut self, kind: SensorKind, values: &[f32]) {
        match kind {
            SensorKind::Accelerometer => {
                assign(&mut self.accel.x, values.first());
                assign(&mut self.accel.y, values.get(1));
                assign(&mut self.accel.z, values.get(2));
            }
            SensorKind::Gyroscope => {
                assign(&mut self.gyro.gx, values.first());
                assign(&mut self.gyro.gy, values.get(1));
                assign(&mut self.gyro.gz, values.get(2));
            }
            SensorKind::Proximity => assign(&mut self.proximity, values.first()),
            SensorKind::Light => assign(&mut self.light, values.first()),
        }
    }

    /// Registra o instante do último evento recebido.
    pub fn stamp(&mut self, now_millis: u64) {
        self.timestamp_millis = now_millis;
    }

    pub fn has_proximity(&self) -> bool {
        self.proximity != NO_READING
    }

    pub fn has_light(&self) -> bool {
        self.light != NO_READING
    }

    /// Linhas para exibição local, truncadas em 2 casas.
    ///
    /// Apenas apresentação: o frame enviado mantém a precisão completa.
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("X: {:.2}", self.accel.x),
            format!("Y: {:.2}", self.accel.y),
            format!("Z: {:.2}", self.accel.z),
            format!("Gx: {:.2}", self.gyro.gx),
            format!("Gy: {:.2}", self.gyro.gy),
            format!("Gz: {:.2}", self.gyro.gz),
        ];
        lines.push(if self.has_proximity() {
            format!("Proximity: {:.2}", self.proximity)
        } else {
            "Proximity: --".into()
        });
        lines.push(if self.has_light() {
            format!("Light: {:.2}", self.light)
        } else {
            "Light: --".into()
        });
        lines
    }
}

fn assign(field: &mut f32, value: Option<&f32>) {
    if let Some(v) = value {
        *field = *v;
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
