use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use sensehub_core::{
    allocate, bring_up, Addressable, AllocationError, AllocatorConfig,
    EnableLine, Polarity, Slot,
};

const DEFAULT: u8 = 0x29;

// ---------------------------------------------------------------------------
// Bus model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Pin(usize, bool),
    Delay(u32),
    Init(usize, u8),
    ChangeAddress(usize, u8),
}

/// Every device starts powered at the default address, the way they come up
/// when their enable lines float.
struct Bus {
    events: std::vec::Vec<Event>,
    powered: std::vec::Vec<bool>,
    addresses: std::vec::Vec<u8>,
    fail_init: Option<usize>,
}

type SharedBus = Rc<RefCell<Bus>>;

fn bus(devices: usize) -> SharedBus {
    Rc::new(RefCell::new(Bus {
        events: std::vec::Vec::new(),
        powered: vec![true; devices],
        addresses: vec![DEFAULT; devices],
        fail_init: None,
    }))
}

/// Enable line wired active-high to `id`'s power input.
struct FakePin {
    id: usize,
    bus: SharedBus,
}

impl FakePin {
    fn drive(&mut self, level: bool) -> Result<(), Infallible> {
        let mut bus = self.bus.borrow_mut();
        bus.events.push(Event::Pin(self.id, level));
        if bus.powered[self.id] && !level {
            // Power loss resets the address register.
            bus.addresses[self.id] = DEFAULT;
        }
        bus.powered[self.id] = level;
        Ok(())
    }
}

impl ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FakeError {
    NotPowered,
    Collision,
    Refused,
}

struct FakeDevice {
    id: usize,
    bus: SharedBus,
}

impl Addressable for FakeDevice {
    type Error = FakeError;

    fn default_address(&self) -> u8 {
        DEFAULT
    }

    async fn initialize(&mut self) -> Result<(), FakeError> {
        let mut bus = self.bus.borrow_mut();
        if !bus.powered[self.id] {
            return Err(FakeError::NotPowered);
        }
        let mine = bus.addresses[self.id];
        let collides = (0..bus.powered.len()).any(|other| {
            other != self.id && bus.powered[other] && bus.addresses[other] == mine
        });
        if collides {
            return Err(FakeError::Collision);
        }
        if bus.fail_init == Some(self.id) {
            return Err(FakeError::Refused);
        }
        bus.events.push(Event::Init(self.id, mine));
        Ok(())
    }

    async fn change_address(&mut self, address: u8) -> Result<(), FakeError> {
        let mut bus = self.bus.borrow_mut();
        bus.events.push(Event::ChangeAddress(self.id, address));
        bus.addresses[self.id] = address;
        Ok(())
    }
}

struct FakeDelay {
    bus: SharedBus,
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.bus.borrow_mut().events.push(Event::Delay(ns / 1_000_000));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.bus.borrow_mut().events.push(Event::Delay(ms));
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn slots(bus: &SharedBus, targets: &[u8]) -> Vec<Slot<FakeDevice, FakePin>, 4> {
    let slots = targets
        .iter()
        .enumerate()
        .map(|(id, &target)| Slot {
            device: FakeDevice { id, bus: bus.clone() },
            line: EnableLine::new(
                FakePin { id, bus: bus.clone() },
                Polarity::ActiveHigh,
            )
            .unwrap(),
            target,
        })
        .collect();
    bus.borrow_mut().events.clear();
    slots
}

fn events(bus: &SharedBus) -> std::vec::Vec<Event> {
    bus.borrow().events.clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn devices_are_enabled_one_at_a_time() {
    let bus = bus(2);
    let mut delay = FakeDelay { bus: bus.clone() };

    let allocated = allocate(
        slots(&bus, &[0x30, 0x31]),
        &mut delay,
        &AllocatorConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(
        events(&bus),
        [
            Event::Pin(0, false),
            Event::Pin(1, false),
            Event::Pin(0, true),
            Event::Delay(10),
            Event::Init(0, DEFAULT),
            Event::ChangeAddress(0, 0x30),
            Event::Pin(1, true),
            Event::Delay(10),
            Event::Init(1, DEFAULT),
            Event::ChangeAddress(1, 0x31),
        ]
    );
    let addresses: std::vec::Vec<u8> =
        allocated.iter().map(|a| a.address).collect();
    assert_eq!(addresses, [0x30, 0x31]);
    assert_eq!(bus.borrow().addresses, [0x30, 0x31]);
}

#[futures_test::test]
async fn default_target_skips_address_change() {
    let bus = bus(2);
    let mut delay = FakeDelay { bus: bus.clone() };

    allocate(
        slots(&bus, &[0x30, DEFAULT]),
        &mut delay,
        &AllocatorConfig::default(),
    )
    .await
    .unwrap();

    let changes: std::vec::Vec<Event> = events(&bus)
        .into_iter()
        .filter(|e| matches!(e, Event::ChangeAddress(..)))
        .collect();
    assert_eq!(changes, [Event::ChangeAddress(0, 0x30)]);
    assert_eq!(bus.borrow().addresses, [0x30, DEFAULT]);
}

#[futures_test::test]
async fn settle_delay_is_configurable() {
    let bus = bus(1);
    let mut delay = FakeDelay { bus: bus.clone() };

    allocate(
        slots(&bus, &[0x30]),
        &mut delay,
        &AllocatorConfig { settle_delay_ms: 2 },
    )
    .await
    .unwrap();

    assert!(events(&bus).contains(&Event::Delay(2)));
}

#[futures_test::test]
async fn duplicate_targets_are_rejected_before_touching_lines() {
    let bus = bus(3);
    let mut delay = FakeDelay { bus: bus.clone() };

    let result = allocate(
        slots(&bus, &[0x30, 0x31, 0x30]),
        &mut delay,
        &AllocatorConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(AllocationError::DuplicateAddress(0x30))));
    assert!(events(&bus).is_empty());
}

#[futures_test::test]
async fn default_target_must_be_last() {
    let bus = bus(2);
    let mut delay = FakeDelay { bus: bus.clone() };

    let result = allocate(
        slots(&bus, &[DEFAULT, 0x30]),
        &mut delay,
        &AllocatorConfig::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(AllocationError::DefaultAddressNotLast { index: 0 })
    ));
}

#[futures_test::test]
async fn reserved_addresses_are_rejected() {
    for target in [0x00, 0x05, 0x78, 0x80] {
        let bus = bus(1);
        let mut delay = FakeDelay { bus: bus.clone() };

        let result = allocate(
            slots(&bus, &[target]),
            &mut delay,
            &AllocatorConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(AllocationError::InvalidAddress(t)) if t == target));
    }
}

#[futures_test::test]
async fn init_failure_stops_enumeration() {
    let bus = bus(3);
    bus.borrow_mut().fail_init = Some(1);
    let mut delay = FakeDelay { bus: bus.clone() };

    let result = allocate(
        slots(&bus, &[0x30, 0x31, 0x32]),
        &mut delay,
        &AllocatorConfig::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(AllocationError::Init { index: 1, error: FakeError::Refused })
    ));
    // The third device was never enabled.
    assert!(!events(&bus).contains(&Event::Pin(2, true)));
    assert_eq!(bus.borrow().powered, [true, true, false]);
}

#[futures_test::test]
async fn bring_up_after_power_cycle_restores_address() {
    let bus = bus(2);
    let mut delay = FakeDelay { bus: bus.clone() };
    let config = AllocatorConfig::default();

    let mut allocated =
        allocate(slots(&bus, &[0x30, 0x31]), &mut delay, &config)
            .await
            .unwrap();

    // Device 0 browns out and comes back at the default address.
    let first = &mut allocated[0];
    first.line.deassert().unwrap();
    assert_eq!(bus.borrow().addresses[0], DEFAULT);

    bring_up(0, &mut first.device, &mut first.line, 0x30, &mut delay, &config)
        .await
        .unwrap();

    assert_eq!(bus.borrow().addresses, [0x30, 0x31]);
}

#[futures_test::test]
async fn bring_up_without_power_reports_init_error() {
    struct DeadPin;

    impl ErrorType for DeadPin {
        type Error = Infallible;
    }

    impl OutputPin for DeadPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    let bus = bus(1);
    bus.borrow_mut().powered[0] = false;
    let mut delay = FakeDelay { bus: bus.clone() };
    let mut device = FakeDevice { id: 0, bus: bus.clone() };
    let mut line = EnableLine::new(DeadPin, Polarity::ActiveHigh).unwrap();

    let result = bring_up(
        0,
        &mut device,
        &mut line,
        0x30,
        &mut delay,
        &AllocatorConfig::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(AllocationError::Init { index: 0, error: FakeError::NotPowered })
    ));
}

#[test]
fn active_low_line_inverts_levels() {
    let bus = bus(1);
    let mut line = EnableLine::new(
        FakePin { id: 0, bus: bus.clone() },
        Polarity::ActiveLow,
    )
    .unwrap();
    line.assert().unwrap();
    line.deassert().unwrap();

    assert_eq!(
        events(&bus),
        [Event::Pin(0, true), Event::Pin(0, false), Event::Pin(0, true)]
    );
}
