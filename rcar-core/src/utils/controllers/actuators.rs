//! Servo and drive actuators.
//!
//! Both turn normalized commands into pulse values and write them through a
//! `PwmBus`, either straight to the hardware or into the dispatch queue.
//! Writes are best effort: each one is retried per the actuator's policy
//! and then dropped, so a flaky bus never stops the control loop.

use crate::utils::{
    config::{DriveChannels, ServoCalibration, MAX_PULSE},
    controllers::pwm::PwmBus,
    error::ConfigError,
    math::range::{map_range, RangeMap},
    retry::{retry, RetryPolicy},
};

/// Clamp a computed pulse into the 12-bit range, truncating the fraction.
fn to_pulse(value: f64) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, MAX_PULSE as f64) as u16
}

/// Positional servo on one channel.
///
/// Remembers the last pulse it delivered and skips writes that would not
/// change it.
pub struct ServoActuator<B> {
    bus: B,
    channel: u8,
    angle_to_pulse: RangeMap,
    last_pulse: Option<u16>,
    policy: RetryPolicy,
}

impl<B: PwmBus> ServoActuator<B> {
    pub fn new(
        bus: B,
        calibration: ServoCalibration,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let angle_to_pulse = RangeMap::new(
            (0.0, 180.0),
            (calibration.pulse_min as f64, calibration.pulse_max as f64),
        )?;
        Ok(Self {
            bus,
            channel: calibration.channel,
            angle_to_pulse,
            last_pulse: None,
            policy,
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Last pulse that reached the bus, if any.
    pub fn last_pulse(&self) -> Option<u16> {
        self.last_pulse
    }

    /// Pulse for `angle` degrees (0..=180) under this servo's calibration.
    pub fn pulse_for(
        &self,
        angle: f64,
    ) -> u16 {
        to_pulse(self.angle_to_pulse.apply(angle))
    }

    /// Move to `angle` degrees.
    ///
    /// Returns true if a write reached the bus; false when the pulse is
    /// unchanged or every attempt failed.
    pub fn set_angle(
        &mut self,
        angle: f64,
    ) -> bool {
        if !angle.is_finite() {
            tracing::warn!(channel = self.channel, angle, "non-finite servo angle ignored");
            return false;
        }
        let pulse = self.pulse_for(angle);
        if self.last_pulse == Some(pulse) {
            return false;
        }

        let channel = self.channel;
        let bus = &mut self.bus;
        match retry(self.policy, "servo", || bus.set_pulse(channel, 0, pulse)) {
            Some(()) => {
                tracing::debug!(channel, angle, pulse, "servo moved");
                self.last_pulse = Some(pulse);
                true
            }
            None => false,
        }
    }

    /// Forget the last delivered pulse so the next `set_angle` always writes.
    pub fn invalidate(&mut self) {
        self.last_pulse = None;
    }
}

/// On/off light on one channel, full pulse when on.
pub struct LightActuator<B> {
    bus: B,
    channel: u8,
    on: bool,
    policy: RetryPolicy,
}

impl<B: PwmBus> LightActuator<B> {
    pub fn new(
        bus: B,
        channel: u8,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            bus,
            channel,
            on: false,
            policy,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Switch the light. The state only changes once the write went through.
    pub fn switch(
        &mut self,
        on: bool,
    ) -> bool {
        let channel = self.channel;
        let pulse = if on { MAX_PULSE } else { 0 };
        let bus = &mut self.bus;
        match retry(self.policy, "light", || bus.set_pulse(channel, 0, pulse)) {
            Some(()) => {
                tracing::debug!(channel, on, "light switched");
                self.on = on;
                true
            }
            None => false,
        }
    }
}

/// State of one drive motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorState {
    pub forward_pulse: u16,
    pub reverse_pulse: u16,
    pub brake: bool,
    /// Speed scale in (0, 1].
    pub differential: f64,
}

impl Default for MotorState {
    fn default() -> Self {
        Self {
            forward_pulse: 0,
            reverse_pulse: 0,
            brake: false,
            differential: 1.0,
        }
    }
}

impl MotorState {
    /// Pulses for the forward and reverse channels.
    ///
    /// Braking drives both channels fully on. Otherwise the net of forward
    /// and reverse goes to one channel, scaled by the differential.
    pub fn output(&self) -> (u16, u16) {
        if self.brake {
            return (MAX_PULSE, MAX_PULSE);
        }
        let net = self.forward_pulse as f64 - self.reverse_pulse as f64;
        if net >= 0.0 {
            (to_pulse(net * self.differential), 0)
        } else {
            (0, to_pulse(-net * self.differential))
        }
    }
}

/// DC drive motor behind an H-bridge with separate forward/reverse inputs.
pub struct DriveActuator<B> {
    bus: B,
    channels: DriveChannels,
    state: MotorState,
    policy: RetryPolicy,
}

impl<B: PwmBus> DriveActuator<B> {
    pub fn new(
        bus: B,
        channels: DriveChannels,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            bus,
            channels,
            state: MotorState::default(),
            policy,
        }
    }

    pub fn state(&self) -> &MotorState {
        &self.state
    }

    pub fn channels(&self) -> DriveChannels {
        self.channels
    }

    /// Forward throttle: `value` within `[min, max]` maps onto 0..=4095.
    pub fn forward(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ConfigError> {
        self.state.forward_pulse = to_pulse(map_range(value, min, max, 0.0, MAX_PULSE as f64)?);
        self.recompute();
        Ok(())
    }

    /// Reverse throttle, symmetric to `forward`.
    pub fn reverse(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ConfigError> {
        self.state.reverse_pulse = to_pulse(map_range(value, min, max, 0.0, MAX_PULSE as f64)?);
        self.recompute();
        Ok(())
    }

    pub fn brake(
        &mut self,
        on: bool,
    ) {
        self.state.brake = on;
        self.recompute();
    }

    /// Store the speed scale for this side; takes effect on the next recompute.
    pub fn set_differential(
        &mut self,
        scale: f64,
    ) {
        if !(scale > 0.0 && scale <= 1.0) {
            tracing::warn!(scale, "differential outside (0, 1] ignored");
            return;
        }
        self.state.differential = scale;
    }

    /// Zero both throttles and push the result.
    pub fn stop(&mut self) {
        self.state.forward_pulse = 0;
        self.state.reverse_pulse = 0;
        self.recompute();
    }

    /// Write the pulses implied by the current state to both channels.
    pub fn recompute(&mut self) {
        let (forward, reverse) = self.state.output();
        let DriveChannels {
            forward: fwd_ch,
            reverse: rev_ch,
        } = self.channels;
        let bus = &mut self.bus;
        retry(self.policy, "drive forward", || bus.set_pulse(fwd_ch, 0, forward));
        retry(self.policy, "drive reverse", || bus.set_pulse(rev_ch, 0, reverse));
        tracing::trace!(forward, reverse, brake = self.state.brake, "drive output");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every write; fails the first `fail` calls.
    #[derive(Default)]
    struct RecordingBus {
        writes: Vec<(u8, u16, u16)>,
        fail: usize,
        calls: usize,
    }

    impl PwmBus for RecordingBus {
        type Error = &'static str;

        fn set_pulse(
            &mut self,
            channel: u8,
            on: u16,
            off: u16,
        ) -> Result<(), Self::Error> {
            self.calls += 1;
            if self.calls <= self.fail {
                return Err("nack");
            }
            self.writes.push((channel, on, off));
            Ok(())
        }
    }

    const CAL: ServoCalibration = ServoCalibration {
        channel: 0,
        pulse_min: 225,
        pulse_max: 475,
    };

    const DRIVE: DriveChannels = DriveChannels {
        forward: 4,
        reverse: 5,
    };

    #[test]
    fn servo_maps_angle_onto_calibration() {
        let mut bus = RecordingBus::default();
        let mut servo = ServoActuator::new(&mut bus, CAL, RetryPolicy::DIRECT).unwrap();
        assert_eq!(servo.pulse_for(0.0), 225);
        assert_eq!(servo.pulse_for(180.0), 475);
        assert!(servo.set_angle(90.0));
        drop(servo);
        assert_eq!(bus.writes, vec![(0, 0, 350)]);
    }

    #[test]
    fn servo_skips_repeated_pulse() {
        let mut bus = RecordingBus::default();
        let mut servo = ServoActuator::new(&mut bus, CAL, RetryPolicy::DIRECT).unwrap();
        assert!(servo.set_angle(90.0));
        assert!(!servo.set_angle(90.0));
        assert!(servo.set_angle(100.0));
        assert_eq!(servo.last_pulse(), Some(363));
        drop(servo);
        assert_eq!(bus.writes.len(), 2);
    }

    #[test]
    fn servo_invalidate_forces_rewrite() {
        let mut bus = RecordingBus::default();
        let mut servo = ServoActuator::new(&mut bus, CAL, RetryPolicy::DIRECT).unwrap();
        servo.set_angle(90.0);
        servo.invalidate();
        assert!(servo.set_angle(90.0));
    }

    #[test]
    fn servo_retries_then_succeeds() {
        let mut bus = RecordingBus {
            fail: 2,
            ..Default::default()
        };
        let mut servo = ServoActuator::new(&mut bus, CAL, RetryPolicy::DIRECT).unwrap();
        assert!(servo.set_angle(45.0));
        drop(servo);
        assert_eq!(bus.calls, 3);
        assert_eq!(bus.writes.len(), 1);
    }

    #[test]
    fn servo_gives_up_silently_and_keeps_last_pulse() {
        let mut bus = RecordingBus {
            fail: 3,
            ..Default::default()
        };
        let mut servo = ServoActuator::new(&mut bus, CAL, RetryPolicy::DIRECT).unwrap();
        assert!(!servo.set_angle(45.0));
        assert_eq!(servo.last_pulse(), None);
        // the bus recovered; the same angle is tried again
        assert!(servo.set_angle(45.0));
        drop(servo);
        assert_eq!(bus.calls, 4);
    }

    #[test]
    fn drive_forward_and_reverse_net_out() {
        let mut bus = RecordingBus::default();
        let mut drive = DriveActuator::new(&mut bus, DRIVE, RetryPolicy::DIRECT);
        drive.forward(100.0, 0.0, 100.0).unwrap();
        assert_eq!(drive.state().output(), (4095, 0));
        drive.reverse(50.0, 0.0, 100.0).unwrap();
        assert_eq!(drive.state().reverse_pulse, 2047);
        assert_eq!(drive.state().output(), (2048, 0));
        drive.forward(0.0, 0.0, 100.0).unwrap();
        assert_eq!(drive.state().output(), (0, 2047));
        drop(drive);
        assert_eq!(bus.writes[..2], [(4, 0, 4095), (5, 0, 0)]);
        assert_eq!(bus.writes[4..], [(4, 0, 0), (5, 0, 2047)]);
    }

    #[test]
    fn brake_overrides_throttle() {
        let mut bus = RecordingBus::default();
        let mut drive = DriveActuator::new(&mut bus, DRIVE, RetryPolicy::DIRECT);
        drive.brake(true);
        drive.forward(100.0, 0.0, 100.0).unwrap();
        assert_eq!(drive.state().forward_pulse, 4095);
        assert_eq!(drive.state().output(), (4095, 4095));
        drive.brake(false);
        assert_eq!(drive.state().output(), (4095, 0));
        drop(drive);
        assert_eq!(bus.writes[2..4], [(4, 0, 4095), (5, 0, 4095)]);
    }

    #[test]
    fn differential_scales_output() {
        let mut bus = RecordingBus::default();
        let mut drive = DriveActuator::new(&mut bus, DRIVE, RetryPolicy::DIRECT);
        drive.set_differential(0.5);
        drive.forward(100.0, 0.0, 100.0).unwrap();
        assert_eq!(drive.state().output(), (2047, 0));
        drive.set_differential(0.0);
        assert_eq!(drive.state().differential, 0.5);
    }

    #[test]
    fn stop_zeroes_throttle_but_keeps_differential() {
        let mut bus = RecordingBus::default();
        let mut drive = DriveActuator::new(&mut bus, DRIVE, RetryPolicy::DIRECT);
        drive.set_differential(0.8);
        drive.forward(-32767.0, -32767.0, 32767.0).unwrap();
        drive.forward(32767.0, -32767.0, 32767.0).unwrap();
        drive.stop();
        assert_eq!(drive.state().output(), (0, 0));
        assert_eq!(drive.state().differential, 0.8);
    }

    #[test]
    fn light_switches_full_on_and_off() {
        let mut bus = RecordingBus::default();
        let mut light = LightActuator::new(&mut bus, 8, RetryPolicy::DIRECT);
        assert!(light.switch(true));
        assert!(light.is_on());
        assert!(light.switch(false));
        assert!(!light.is_on());
        drop(light);
        assert_eq!(bus.writes, vec![(8, 0, 4095), (8, 0, 0)]);
    }

    #[test]
    fn light_keeps_state_when_bus_fails() {
        let mut bus = RecordingBus {
            fail: 3,
            ..Default::default()
        };
        let mut light = LightActuator::new(&mut bus, 8, RetryPolicy::DIRECT);
        assert!(!light.switch(true));
        assert!(!light.is_on());
    }

    #[test]
    fn degenerate_throttle_range_rejected() {
        let mut bus = RecordingBus::default();
        let mut drive = DriveActuator::new(&mut bus, DRIVE, RetryPolicy::DIRECT);
        assert!(drive.forward(1.0, 3.0, 3.0).is_err());
        drop(drive);
        assert!(bus.writes.is_empty());
    }
}
