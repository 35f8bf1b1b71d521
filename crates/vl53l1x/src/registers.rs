//! Register map subset used by the driver. Indices are 16-bit, big-endian on
//! the wire, and multi-byte values are big-endian too.

pub const SOFT_RESET: u16 = 0x0000;
pub const I2C_SLAVE_DEVICE_ADDRESS: u16 = 0x0001;
pub const VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND: u16 = 0x0008;
pub const VHV_CONFIG_INIT: u16 = 0x000B;
pub const GPIO_HV_MUX_CTRL: u16 = 0x0030;
pub const GPIO_TIO_HV_STATUS: u16 = 0x0031;
pub const PHASECAL_CONFIG_TIMEOUT_MACROP: u16 = 0x004B;
pub const RANGE_CONFIG_TIMEOUT_MACROP_A: u16 = 0x005E;
pub const RANGE_CONFIG_VCSEL_PERIOD_A: u16 = 0x0060;
pub const RANGE_CONFIG_TIMEOUT_MACROP_B: u16 = 0x0061;
pub const RANGE_CONFIG_VCSEL_PERIOD_B: u16 = 0x0063;
pub const RANGE_CONFIG_VALID_PHASE_HIGH: u16 = 0x0069;
pub const SYSTEM_INTERMEASUREMENT_PERIOD: u16 = 0x006C;
pub const SD_CONFIG_WOI_SD0: u16 = 0x0078;
pub const SD_CONFIG_INITIAL_PHASE_SD0: u16 = 0x007A;
pub const SYSTEM_INTERRUPT_CLEAR: u16 = 0x0086;
pub const SYSTEM_MODE_START: u16 = 0x0087;
pub const RESULT_RANGE_STATUS: u16 = 0x0089;
pub const RESULT_FINAL_RANGE_MM: u16 = 0x0096;
pub const RESULT_OSC_CALIBRATE_VAL: u16 = 0x00DE;
pub const FIRMWARE_SYSTEM_STATUS: u16 = 0x00E5;
pub const IDENTIFICATION_MODEL_ID: u16 = 0x010F;

/// First register covered by [`DEFAULT_CONFIGURATION`].
pub const DEFAULT_CONFIGURATION_START: u16 = 0x002D;

/// Register image for 0x2D..=0x87 loaded at init. Leaves the device in long
/// distance mode, interrupt on new sample, active-high GPIO1, ranging stopped.
pub const DEFAULT_CONFIGURATION: [u8; 91] = [
    0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x02, 0x08, // 0x2D
    0x00, 0x08, 0x10, 0x01, 0x01, 0x00, 0x00, 0x00, // 0x35
    0x00, 0xFF, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, // 0x3D
    0x00, 0x20, 0x0B, 0x00, 0x00, 0x02, 0x0A, 0x21, // 0x45
    0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0xC8, // 0x4D
    0x00, 0x00, 0x38, 0xFF, 0x01, 0x00, 0x08, 0x00, // 0x55
    0x00, 0x01, 0xCC, 0x0F, 0x01, 0xF1, 0x0D, 0x01, // 0x5D
    0x68, 0x00, 0x80, 0x08, 0xB8, 0x00, 0x00, 0x00, // 0x65
    0x00, 0x0F, 0x89, 0x00, 0x00, 0x00, 0x00, 0x00, // 0x6D
    0x00, 0x00, 0x01, 0x0F, 0x0D, 0x0E, 0x0E, 0x00, // 0x75
    0x00, 0x02, 0xC7, 0xFF, 0x9B, 0x00, 0x00, 0x00, // 0x7D
    0x01, 0x00, 0x00, // 0x85
];

/// Raw `RESULT__RANGE_STATUS` (low five bits) to the reduced status code
/// where 0 is a valid range. 255 marks codes without a meaning.
pub const RANGE_STATUS_MAP: [u8; 24] = [
    255, 255, 255, 5, 2, 4, 1, 7, 3, 0, 255, 255, 9, 13, 255, 255, 255, 255,
    10, 6, 255, 255, 11, 12,
];
