#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

// This must go first so the logging macros are visible to every module.
#[macro_use]
pub(crate) mod fmt;

pub mod acquisition;
pub mod allocator;
pub mod config;
pub mod error;
pub mod link;
pub mod policy;
pub mod sample;
pub mod sink;
pub mod startup;
pub mod status;

pub use acquisition::{AcquisitionLoop, LoopContext, TickSchedule};
pub use allocator::{
    allocate, bring_up, Addressable, Allocated, EnableLine, Polarity, Slot,
};
pub use config::{AcquisitionConfig, AllocatorConfig, OutputFormat};
pub use error::{AllocationError, StartupError};
pub use link::{
    DeviceLink, InitError, LinkState, Polled, Recovery, SensorLink,
};
pub use policy::ReinitPolicy;
pub use sample::{Payload, Reading, Sample, SampleKind};
pub use sink::{decode_frame, encode_frame, encode_text, SampleSink};
pub use startup::{bounded_wait, HostWait};
pub use status::{StatusIndicator, StatusPhase, StatusSignal};
