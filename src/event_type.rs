use std::fmt::{self, Display, Formatter, LowerHex};

use serde::{Serialize, Serializer};

/// Index of the PCR that an event was measured to.
pub type PcrIndex = u32;

/// The type of an event, as recorded in the log.
///
/// Any 32-bit value is valid. Values defined by the TCG PC Client and EFI platform
/// specifications have a canonical name, everything else renders as 8 hex digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(pub u32);

const EFI_EVENT_BASE: u32 = 0x8000_0000;

impl EventType {
    pub const PREBOOT_CERT: EventType = EventType(0x0000_0000);
    pub const POST_CODE: EventType = EventType(0x0000_0001);
    pub const NO_ACTION: EventType = EventType(0x0000_0003);
    pub const SEPARATOR: EventType = EventType(0x0000_0004);
    pub const ACTION: EventType = EventType(0x0000_0005);
    pub const EVENT_TAG: EventType = EventType(0x0000_0006);
    pub const S_CRTM_CONTENTS: EventType = EventType(0x0000_0007);
    pub const S_CRTM_VERSION: EventType = EventType(0x0000_0008);
    pub const CPU_MICROCODE: EventType = EventType(0x0000_0009);
    pub const PLATFORM_CONFIG_FLAGS: EventType = EventType(0x0000_000a);
    pub const TABLE_OF_DEVICES: EventType = EventType(0x0000_000b);
    pub const COMPACT_HASH: EventType = EventType(0x0000_000c);
    pub const IPL: EventType = EventType(0x0000_000d);
    pub const IPL_PARTITION_DATA: EventType = EventType(0x0000_000e);
    pub const NONHOST_CODE: EventType = EventType(0x0000_000f);
    pub const NONHOST_CONFIG: EventType = EventType(0x0000_0010);
    pub const NONHOST_INFO: EventType = EventType(0x0000_0011);
    pub const OMIT_BOOT_DEVICE_EVENTS: EventType = EventType(0x0000_0012);

    pub const EFI_VARIABLE_DRIVER_CONFIG: EventType = EventType(EFI_EVENT_BASE + 0x1);
    pub const EFI_VARIABLE_BOOT: EventType = EventType(EFI_EVENT_BASE + 0x2);
    pub const EFI_BOOT_SERVICES_APPLICATION: EventType = EventType(EFI_EVENT_BASE + 0x3);
    pub const EFI_BOOT_SERVICES_DRIVER: EventType = EventType(EFI_EVENT_BASE + 0x4);
    pub const EFI_RUNTIME_SERVICES_DRIVER: EventType = EventType(EFI_EVENT_BASE + 0x5);
    pub const EFI_GPT_EVENT: EventType = EventType(EFI_EVENT_BASE + 0x6);
    pub const EFI_ACTION: EventType = EventType(EFI_EVENT_BASE + 0x7);
    pub const EFI_PLATFORM_FIRMWARE_BLOB: EventType = EventType(EFI_EVENT_BASE + 0x8);
    pub const EFI_HANDOFF_TABLES: EventType = EventType(EFI_EVENT_BASE + 0x9);
    pub const EFI_HCRTM_EVENT: EventType = EventType(EFI_EVENT_BASE + 0x10);
    pub const EFI_VARIABLE_AUTHORITY: EventType = EventType(EFI_EVENT_BASE + 0xe0);

    /// The canonical name of this event type, if it has one.
    pub fn known_name(self) -> Option<&'static str> {
        let name = match self {
            EventType::PREBOOT_CERT => "EV_PREBOOT_CERT",
            EventType::POST_CODE => "EV_POST_CODE",
            EventType::NO_ACTION => "EV_NO_ACTION",
            EventType::SEPARATOR => "EV_SEPARATOR",
            EventType::ACTION => "EV_ACTION",
            EventType::EVENT_TAG => "EV_EVENT_TAG",
            EventType::S_CRTM_CONTENTS => "EV_S_CRTM_CONTENTS",
            EventType::S_CRTM_VERSION => "EV_S_CRTM_VERSION",
            EventType::CPU_MICROCODE => "EV_CPU_MICROCODE",
            EventType::PLATFORM_CONFIG_FLAGS => "EV_PLATFORM_CONFIG_FLAGS",
            EventType::TABLE_OF_DEVICES => "EV_TABLE_OF_DEVICES",
            EventType::COMPACT_HASH => "EV_COMPACT_HASH",
            EventType::IPL => "EV_IPL",
            EventType::IPL_PARTITION_DATA => "EV_IPL_PARTITION_DATA",
            EventType::NONHOST_CODE => "EV_NONHOST_CODE",
            EventType::NONHOST_CONFIG => "EV_NONHOST_CONFIG",
            EventType::NONHOST_INFO => "EV_NONHOST_INFO",
            EventType::OMIT_BOOT_DEVICE_EVENTS => "EV_OMIT_BOOT_DEVICE_EVENTS",
            EventType::EFI_VARIABLE_DRIVER_CONFIG => "EV_EFI_VARIABLE_DRIVER_CONFIG",
            EventType::EFI_VARIABLE_BOOT => "EV_EFI_VARIABLE_BOOT",
            EventType::EFI_BOOT_SERVICES_APPLICATION => "EV_EFI_BOOT_SERVICES_APPLICATION",
            EventType::EFI_BOOT_SERVICES_DRIVER => "EV_EFI_BOOT_SERVICES_DRIVER",
            EventType::EFI_RUNTIME_SERVICES_DRIVER => "EV_EFI_RUNTIME_SERVICES_DRIVER",
            EventType::EFI_GPT_EVENT => "EV_EFI_GPT_EVENT",
            EventType::EFI_ACTION => "EV_EFI_ACTION",
            EventType::EFI_PLATFORM_FIRMWARE_BLOB => "EV_EFI_PLATFORM_FIRMWARE_BLOB",
            EventType::EFI_HANDOFF_TABLES => "EV_EFI_HANDOFF_TABLES",
            EventType::EFI_HCRTM_EVENT => "EV_EFI_HCRTM_EVENT",
            EventType::EFI_VARIABLE_AUTHORITY => "EV_EFI_VARIABLE_AUTHORITY",
            _ => return None,
        };
        Some(name)
    }

    /// Canonical name, or the zero padded hex form for unnamed types.
    pub fn name(self) -> String {
        self.to_string()
    }
}

impl From<u32> for EventType {
    fn from(raw: u32) -> Self {
        EventType(raw)
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.known_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:08x}", self.0),
        }
    }
}

impl LowerHex for EventType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
