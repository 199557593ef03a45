use crate::devices::types::{Device, DeviceContext};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// A shared renewable producer with stochastic output.
///
/// Each tick the instantaneous production is a uniform random fraction of
/// the peak `max_pi_kw`. The sampled energy of the latest tick is kept for
/// telemetry.
#[derive(Debug, Clone)]
pub struct Producer {
    /// Owning member.
    pub member_id: String,

    /// Producer identifier, unique within the member.
    pub producer_id: String,

    /// Peak instantaneous production in kilowatts.
    pub max_pi_kw: f32,

    /// Energy produced during the most recent tick (kWh).
    pub last_kwh: f32,

    rng: StdRng,
}

impl Producer {
    /// Creates a producer with its own seeded random source.
    ///
    /// # Panics
    ///
    /// Panics if `max_pi_kw` is negative or not finite.
    pub fn new(member_id: &str, producer_id: &str, max_pi_kw: f32, seed: u64) -> Self {
        assert!(max_pi_kw.is_finite() && max_pi_kw >= 0.0);
        Self {
            member_id: member_id.to_string(),
            producer_id: producer_id.to_string(),
            max_pi_kw,
            last_kwh: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Samples the tick's energy and remembers it for telemetry.
    pub fn produce(&mut self, context: &DeviceContext) -> f32 {
        self.last_kwh = self.energy_kwh(context);
        self.last_kwh
    }
}

impl Device for Producer {
    fn power_kw(&mut self, _context: &DeviceContext) -> f32 {
        self.max_pi_kw * self.rng.random::<f32>()
    }
}
