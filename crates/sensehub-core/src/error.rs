use core::fmt;

/// Failure while assigning bus addresses at boot. Any variant is fatal for
/// the allocation run: devices enabled after the failing one are never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocationError<DeviceE, PinE> {
    /// Two slots asked for the same target address.
    DuplicateAddress(u8),
    /// Target outside the 7-bit range, or in a reserved block.
    InvalidAddress(u8),
    /// A slot keeps the default address but is not the last one enabled,
    /// so the next device would power up on top of it.
    DefaultAddressNotLast { index: usize },
    /// Driving the enable line failed.
    EnableLine { index: usize, error: PinE },
    /// The device did not answer its initialization sequence.
    Init { index: usize, error: DeviceE },
    /// The device answered but refused the new address.
    AddressChange { index: usize, error: DeviceE },
}

impl<DeviceE, PinE> AllocationError<DeviceE, PinE> {
    /// Slot the error refers to, when it refers to one.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::DuplicateAddress(_) | Self::InvalidAddress(_) => None,
            Self::DefaultAddressNotLast { index }
            | Self::EnableLine { index, .. }
            | Self::Init { index, .. }
            | Self::AddressChange { index, .. } => Some(*index),
        }
    }
}

impl<DeviceE: fmt::Debug, PinE: fmt::Debug> fmt::Display
    for AllocationError<DeviceE, PinE>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateAddress(addr) => {
                write!(f, "address {:#04x} requested twice", addr)
            }
            Self::InvalidAddress(addr) => {
                write!(f, "address {:#04x} is not a usable 7-bit address", addr)
            }
            Self::DefaultAddressNotLast { index } => write!(
                f,
                "device {} keeps the default address but is not last",
                index
            ),
            Self::EnableLine { index, error } => {
                write!(f, "enable line {} failed: {:?}", index, error)
            }
            Self::Init { index, error } => {
                write!(f, "device {} did not initialize: {:?}", index, error)
            }
            Self::AddressChange { index, error } => {
                write!(f, "device {} refused new address: {:?}", index, error)
            }
        }
    }
}

/// A link that was not Ready when the loop was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartupError {
    pub index: usize,
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link {} is not ready", self.index)
    }
}
