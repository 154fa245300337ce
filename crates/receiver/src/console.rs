//! Formatação legível dos frames recebidos.

use sensor_core::protocol::StreamFrame;

/// Linhas de log de um frame.
pub fn frame_lines(frame: &StreamFrame) -> Vec<String> {
    let mut lines = Vec::with_capacity(4);

    if frame.timestamp != 0 {
        lines.push(format!(
            "--- Timestamp: {:.3} s ---",
            frame.timestamp as f64 / 1000.0
        ));
    } else {
        lines.push("--- Data Received ---".into());
    }

    let a = &frame.accelerometer;
    lines.push(format!(
        "  Accelerometer: X={:.2}, Y={:.2}, Z={:.2}",
        a.x, a.y, a.z
    ));

    if let Some(g) = &frame.gyroscope {
        lines.push(format!(
            "  Gyroscope: Gx={:.2}, Gy={:.2}, Gz={:.2}",
            g.gx, g.gy, g.gz
        ));
    }

    let mut extras = Vec::new();
    if let Some(p) = frame.proximity {
        extras.push(format!("Proximity={}", optional_reading(p)));
    }
    if let Some(l) = frame.light {
        extras.push(format!("Light={}", optional_reading(l)));
    }
    if let Some(label) = &frame.label {
        extras.push(format!("Label={label}"));
    }
    if !extras.is_empty() {
        lines.push(format!("  {}", extras.join(", ")));
    }

    lines
}

fn optional_reading(value: f32) -> String {
    if value == sensor_core::types::NO_READING {
        "--".into()
    } else {
        format!("{value:.2}")
    }
}
