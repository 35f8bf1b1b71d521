//! Bus address allocation for identical devices that all power up at the same
//! factory default address.
//!
//! Every device sits behind its own enable line. All lines are first driven
//! inactive, then the devices are woken one at a time: while device `i` is the
//! only one listening at the default address it is initialized and moved to
//! its target address, and only then is device `i + 1` enabled.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::config::AllocatorConfig;
use crate::error::AllocationError;
use crate::fmt::Dbg;

/// Electrical sense of an enable line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// Power/reset line of one device (XSHUT, RST, CS...).
pub struct EnableLine<P> {
    pin: P,
    polarity: Polarity,
}

impl<P: OutputPin> EnableLine<P> {
    /// Wrap `pin` and immediately drive it inactive.
    pub fn new(pin: P, polarity: Polarity) -> Result<Self, P::Error> {
        let mut line = Self { pin, polarity };
        line.deassert()?;
        Ok(line)
    }

    pub fn assert(&mut self) -> Result<(), P::Error> {
        match self.polarity {
            Polarity::ActiveHigh => self.pin.set_high(),
            Polarity::ActiveLow => self.pin.set_low(),
        }
    }

    pub fn deassert(&mut self) -> Result<(), P::Error> {
        match self.polarity {
            Polarity::ActiveHigh => self.pin.set_low(),
            Polarity::ActiveLow => self.pin.set_high(),
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

/// A device whose bus address can be reassigned at runtime.
pub trait Addressable {
    type Error: core::fmt::Debug;

    /// Address the device answers on after power-up.
    fn default_address(&self) -> u8;

    /// Bring the device up at whatever address it currently answers on.
    async fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Move the device to `address`. Subsequent transactions use the new one.
    async fn change_address(&mut self, address: u8) -> Result<(), Self::Error>;
}

impl<T: Addressable + ?Sized> Addressable for &mut T {
    type Error = T::Error;

    fn default_address(&self) -> u8 {
        T::default_address(self)
    }

    async fn initialize(&mut self) -> Result<(), Self::Error> {
        T::initialize(self).await
    }

    async fn change_address(&mut self, address: u8) -> Result<(), Self::Error> {
        T::change_address(self, address).await
    }
}

/// One entry of the allocation plan.
pub struct Slot<D, P> {
    pub device: D,
    pub line: EnableLine<P>,
    pub target: u8,
}

/// A device that answers on its assigned address, its line still asserted.
pub struct Allocated<D, P> {
    pub index: usize,
    pub address: u8,
    pub device: D,
    pub line: EnableLine<P>,
}

/// `0x00..=0x07` and `0x78..=0x7F` are reserved by the I2C specification.
pub const fn is_valid_address(address: u8) -> bool {
    address >= 0x08 && address <= 0x77
}

fn validate<D, P, const N: usize>(
    slots: &Vec<Slot<D, P>, N>,
) -> Result<(), AllocationError<D::Error, P::Error>>
where
    D: Addressable,
    P: OutputPin,
{
    let last = slots.len().saturating_sub(1);
    for (index, slot) in slots.iter().enumerate() {
        if !is_valid_address(slot.target) {
            return Err(AllocationError::InvalidAddress(slot.target));
        }
        if slots[..index].iter().any(|s| s.target == slot.target) {
            return Err(AllocationError::DuplicateAddress(slot.target));
        }
        if slot.target == slot.device.default_address() && index != last {
            return Err(AllocationError::DefaultAddressNotLast { index });
        }
    }
    Ok(())
}

/// Enable one device, let it settle, initialize it at its default address and
/// move it to `target` if that differs. The line is left asserted.
///
/// The caller guarantees no other device on the bus currently answers on the
/// default address.
pub async fn bring_up<D, P, Dl>(
    index: usize,
    device: &mut D,
    line: &mut EnableLine<P>,
    target: u8,
    delay: &mut Dl,
    config: &AllocatorConfig,
) -> Result<(), AllocationError<D::Error, P::Error>>
where
    D: Addressable,
    P: OutputPin,
    Dl: DelayNs,
{
    line.assert()
        .map_err(|error| AllocationError::EnableLine { index, error })?;
    delay.delay_ms(config.settle_delay_ms).await;

    device.initialize().await.map_err(|error| {
        error!("alloc: device {} init failed: {:?}", index, Dbg(&error));
        AllocationError::Init { index, error }
    })?;

    let default = device.default_address();
    if target != default {
        device.change_address(target).await.map_err(|error| {
            error!(
                "alloc: device {} rejected {:#x}: {:?}",
                index,
                target,
                Dbg(&error)
            );
            AllocationError::AddressChange { index, error }
        })?;
    }
    info!("alloc: device {} at {:#x}", index, target);
    Ok(())
}

/// Assign every slot its target address, strictly in slot order.
///
/// Fails fast: on the first error the remaining devices stay disabled and the
/// error is returned. Already allocated devices are dropped with it.
pub async fn allocate<D, P, Dl, const N: usize>(
    mut slots: Vec<Slot<D, P>, N>,
    delay: &mut Dl,
    config: &AllocatorConfig,
) -> Result<Vec<Allocated<D, P>, N>, AllocationError<D::Error, P::Error>>
where
    D: Addressable,
    P: OutputPin,
    Dl: DelayNs,
{
    validate(&slots)?;

    for (index, slot) in slots.iter_mut().enumerate() {
        slot.line
            .deassert()
            .map_err(|error| AllocationError::EnableLine { index, error })?;
    }

    let mut allocated = Vec::new();
    for (index, mut slot) in slots.into_iter().enumerate() {
        bring_up(
            index,
            &mut slot.device,
            &mut slot.line,
            slot.target,
            delay,
            config,
        )
        .await?;
        // Capacity matches the input, the push cannot fail.
        let _ = allocated.push(Allocated {
            index,
            address: slot.target,
            device: slot.device,
            line: slot.line,
        });
    }
    Ok(allocated)
}
