use liquidgrid_field::DisplacementField;
use serde::Serialize;

/// Read-only statistics over a displacement field.
pub struct FieldInspector;

impl FieldInspector {
    pub fn summary(field: &DisplacementField) -> FieldSummary {
        let snapshot = field.read();
        let mut max_magnitude = 0.0_f32;
        let mut sum = 0.0_f64;
        let mut energy = 0.0_f64;
        let mut active_cells = 0;
        for v in snapshot.samples {
            let m = v.length();
            max_magnitude = max_magnitude.max(m);
            sum += m as f64;
            energy += v.length_squared() as f64;
            if m > 0.0 {
                active_cells += 1;
            }
        }
        let cells = snapshot.samples.len().max(1);
        FieldSummary {
            size: snapshot.size,
            ticks: field.ticks(),
            max_magnitude,
            mean_magnitude: (sum / cells as f64) as f32,
            energy,
            active_cells,
            state_hash: field.state_hash(),
        }
    }

    /// Column and row of the strongest sample, if any sample is non-zero.
    pub fn peak_cell(field: &DisplacementField) -> Option<(usize, usize)> {
        let snapshot = field.read();
        let (index, v) = snapshot
            .samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.length_squared().total_cmp(&b.1.length_squared()))?;
        if v.length_squared() == 0.0 {
            return None;
        }
        Some((index % snapshot.size, index / snapshot.size))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub size: usize,
    pub ticks: u64,
    pub max_magnitude: f32,
    pub mean_magnitude: f32,
    /// Sum of squared sample magnitudes.
    pub energy: f64,
    /// Samples with non-zero magnitude.
    pub active_cells: usize,
    pub state_hash: u64,
}

impl std::fmt::Display for FieldSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Field {n}x{n}: ticks={} max={:.4} mean={:.5} energy={:.4} active={} hash={:016x}",
            self.ticks,
            self.max_magnitude,
            self.mean_magnitude,
            self.energy,
            self.active_cells,
            self.state_hash,
            n = self.size,
        )
    }
}
