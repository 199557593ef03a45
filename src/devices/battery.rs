/// Energy flows resolved by one battery settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryFlow {
    /// Production offered to the battery this tick (kWh).
    pub production_kwh: f32,
    /// Consumption served from the battery (kWh).
    pub battery_consumption_kwh: f32,
    /// Consumption beyond the available charge, served by the external grid (kWh).
    pub non_battery_consumption_kwh: f32,
    /// Production that did not fit under the capacity ceiling (kWh).
    pub curtailed_kwh: f32,
}

/// The community's shared battery.
///
/// Holds a stored energy value in `[0, max_capacity_kwh]`. The bounds are
/// enforced on every settlement, whatever the inputs.
#[derive(Debug, Clone)]
pub struct Battery {
    /// Maximum stored energy in kilowatt-hours.
    pub max_capacity_kwh: f32,

    /// Currently stored energy in kilowatt-hours.
    value_kwh: f32,

    /// Flows of the most recent settlement.
    last_flow: BatteryFlow,
}

impl Battery {
    /// Creates a new battery.
    ///
    /// # Panics
    ///
    /// Panics if capacity is not positive or the initial value is out of range.
    pub fn new(max_capacity_kwh: f32, initial_kwh: f32) -> Self {
        assert!(max_capacity_kwh.is_finite() && max_capacity_kwh > 0.0);
        assert!((0.0..=max_capacity_kwh).contains(&initial_kwh));
        Self {
            max_capacity_kwh,
            value_kwh: initial_kwh,
            last_flow: BatteryFlow::default(),
        }
    }

    /// Currently stored energy (kWh).
    pub fn value_kwh(&self) -> f32 {
        self.value_kwh
    }

    pub fn last_flow(&self) -> BatteryFlow {
        self.last_flow
    }

    /// Applies one tick of production and consumption.
    ///
    /// `value = clamp(value + production - consumption, 0, max_capacity)`.
    /// Consumption is drawn from the charge available this tick; anything
    /// beyond it is reported as non-battery consumption. Negative or NaN
    /// inputs count as zero.
    pub fn settle(&mut self, production_kwh: f32, consumption_kwh: f32) -> BatteryFlow {
        let production_kwh = production_kwh.max(0.0);
        let consumption_kwh = consumption_kwh.max(0.0);

        let available = self.value_kwh + production_kwh;
        let battery_consumption_kwh = consumption_kwh.min(available);
        let non_battery_consumption_kwh = consumption_kwh - battery_consumption_kwh;
        let remaining = available - battery_consumption_kwh;

        self.value_kwh = remaining.clamp(0.0, self.max_capacity_kwh);
        let flow = BatteryFlow {
            production_kwh,
            battery_consumption_kwh,
            non_battery_consumption_kwh,
            curtailed_kwh: (remaining - self.max_capacity_kwh).max(0.0),
        };
        self.last_flow = flow;
        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_battery() {
        let battery = Battery::new(10.0, 4.0);
        assert_eq!(battery.max_capacity_kwh, 10.0);
        assert_eq!(battery.value_kwh(), 4.0);
        assert_eq!(battery.last_flow(), BatteryFlow::default());
    }

    #[test]
    #[should_panic]
    fn test_invalid_capacity() {
        Battery::new(0.0, 0.0);
    }

    #[test]
    #[should_panic]
    fn test_initial_above_capacity() {
        Battery::new(10.0, 10.5);
    }

    #[test]
    fn production_charges_up_to_capacity() {
        let mut battery = Battery::new(10.0, 9.0);
        let flow = battery.settle(3.0, 0.0);
        assert_eq!(battery.value_kwh(), 10.0);
        assert!((flow.curtailed_kwh - 2.0).abs() < 1e-6);
    }

    #[test]
    fn consumption_drawn_from_battery_first() {
        let mut battery = Battery::new(10.0, 5.0);
        let flow = battery.settle(0.0, 2.0);
        assert_eq!(battery.value_kwh(), 3.0);
        assert_eq!(flow.battery_consumption_kwh, 2.0);
        assert_eq!(flow.non_battery_consumption_kwh, 0.0);
    }

    #[test]
    fn deficit_is_reported_not_negative() {
        let mut battery = Battery::new(10.0, 1.0);
        let flow = battery.settle(0.5, 4.0);
        assert_eq!(battery.value_kwh(), 0.0);
        assert!((flow.battery_consumption_kwh - 1.5).abs() < 1e-6);
        assert!((flow.non_battery_consumption_kwh - 2.5).abs() < 1e-6);
    }

    #[test]
    fn same_tick_production_serves_consumption() {
        let mut battery = Battery::new(10.0, 0.0);
        let flow = battery.settle(2.0, 1.5);
        assert!((battery.value_kwh() - 0.5).abs() < 1e-6);
        assert_eq!(flow.non_battery_consumption_kwh, 0.0);
    }

    #[test]
    fn negative_inputs_are_ignored() {
        let mut battery = Battery::new(10.0, 5.0);
        battery.settle(-3.0, -1.0);
        assert_eq!(battery.value_kwh(), 5.0);
        battery.settle(f32::NAN, 0.0);
        assert_eq!(battery.value_kwh(), 5.0);
    }
}
