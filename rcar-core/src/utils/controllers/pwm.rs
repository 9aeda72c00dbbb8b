//! PWM bus abstraction and its PCA9685 binding.
//!
//! The only thing the control pipeline needs from the hardware is "set the
//! on/off ticks of one channel", which may fail transiently. Frequency
//! setup happens once at start-up through `configure_pca9685`.

use embedded_hal::i2c::I2c;
use pwm_pca9685::{Channel, Pca9685};

use crate::utils::{config::PCA9685_CHANNELS, error::BusError};

/// A bus that can set the pulse of one PWM channel.
pub trait PwmBus {
    type Error: core::fmt::Debug;

    /// Set channel `channel` to switch on at tick `on` and off at tick `off`
    /// (both within 0..=4095).
    fn set_pulse(
        &mut self,
        channel: u8,
        on: u16,
        off: u16,
    ) -> Result<(), Self::Error>;
}

impl<B: PwmBus + ?Sized> PwmBus for &mut B {
    type Error = B::Error;

    fn set_pulse(
        &mut self,
        channel: u8,
        on: u16,
        off: u16,
    ) -> Result<(), Self::Error> {
        (**self).set_pulse(channel, on, off)
    }
}

const CHANNELS: [Channel; PCA9685_CHANNELS] = [
    Channel::C0,
    Channel::C1,
    Channel::C2,
    Channel::C3,
    Channel::C4,
    Channel::C5,
    Channel::C6,
    Channel::C7,
    Channel::C8,
    Channel::C9,
    Channel::C10,
    Channel::C11,
    Channel::C12,
    Channel::C13,
    Channel::C14,
    Channel::C15,
];

impl<I2C, E> PwmBus for Pca9685<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = BusError<E>;

    fn set_pulse(
        &mut self,
        channel: u8,
        on: u16,
        off: u16,
    ) -> Result<(), Self::Error> {
        let ch = *CHANNELS
            .get(channel as usize)
            .ok_or(BusError::InvalidChannel(channel))?;
        self.set_channel_on_off(ch, on, off)
            .map_err(BusError::Pwm)
    }
}

/// Enable the PCA9685 oscillator and set its prescale (100 gives ~60Hz).
pub fn configure_pca9685<I2C, E>(
    pca: &mut Pca9685<I2C>,
    prescale: u8,
) -> Result<(), BusError<E>>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    pca.enable().map_err(BusError::Pwm)?;
    tracing::info!("PWM enabled");
    pca.set_prescale(prescale).map_err(BusError::Pwm)?;
    tracing::info!(prescale, "PWM prescale set");
    Ok(())
}
