/// A simulation clock that counts fixed-length ticks.
///
/// The `Clock` hands out tick indices and converts them to simulated
/// seconds since the start of the run.
///
/// # Examples
///
/// ```
/// use rec_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(60);
/// assert_eq!(clock.tick(), 0);
/// assert_eq!(clock.tick(), 1);
/// assert_eq!(clock.elapsed_s(), 120);
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    /// Number of ticks completed so far
    completed: u64,
    /// Simulated seconds per tick
    tick_seconds: u64,
}

impl Clock {
    /// Creates a new clock at time zero.
    ///
    /// # Arguments
    ///
    /// * `tick_seconds` - Simulated seconds advanced by each tick
    pub fn new(tick_seconds: u64) -> Self {
        Self {
            completed: 0,
            tick_seconds,
        }
    }

    /// Advances the clock by one tick.
    ///
    /// # Returns
    ///
    /// The index of the tick that is starting (0 for the first call).
    pub fn tick(&mut self) -> u64 {
        let tick = self.completed;
        self.completed += 1;
        tick
    }

    /// Number of ticks started so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Simulated seconds elapsed after the started ticks.
    pub fn elapsed_s(&self) -> u64 {
        self.completed * self.tick_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock() {
        let clock = Clock::new(60);
        assert_eq!(clock.completed(), 0);
        assert_eq!(clock.elapsed_s(), 0);
    }

    #[test]
    fn test_tick() {
        let mut clock = Clock::new(30);
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.completed(), 2);
        assert_eq!(clock.elapsed_s(), 60);
    }
}
