//! Common types and traits for device simulation components.

/// Contextual information passed to devices during energy calculations.
///
/// # Fields
/// * `tick` - Current simulation tick
/// * `dt_hours` - Simulated duration of the tick in hours
#[derive(Debug, Clone, Copy)]
pub struct DeviceContext {
    pub tick: u64,
    pub dt_hours: f32,
}

impl DeviceContext {
    /// Creates a new DeviceContext for the given tick and tick length.
    pub fn new(tick: u64, dt_hours: f32) -> Self {
        Self { tick, dt_hours }
    }
}

/// Trait defining a device that produces or consumes electricity.
///
/// Both producers and consumers report positive magnitudes; the engine
/// decides which side of the battery balance a device lands on.
pub trait Device {
    /// Returns the average power over the tick in kilowatts (>= 0).
    fn power_kw(&mut self, context: &DeviceContext) -> f32;

    /// Energy delivered or drawn over the tick in kWh.
    fn energy_kwh(&mut self, context: &DeviceContext) -> f32 {
        self.power_kw(context) * context.dt_hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);

    impl Device for Constant {
        fn power_kw(&mut self, _context: &DeviceContext) -> f32 {
            self.0
        }
    }

    #[test]
    fn energy_scales_power_by_tick_length() {
        let mut d = Constant(3.0);
        let ctx = DeviceContext::new(0, 1.0 / 60.0);
        assert!((d.energy_kwh(&ctx) - 0.05).abs() < 1e-6);
    }
}
