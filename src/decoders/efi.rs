//! UEFI structures measured by firmware, as defined by the TCG PC Client Platform Firmware
//! Profile specification.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::err::{DecodeError, DecodeResult};
use crate::event_data::serialize_as_hex;
use crate::guid::Guid;
use crate::utils::{ByteCursor, decode_utf16le_z};

const GPT_HEADER_SIGNATURE: &[u8; 8] = b"EFI PART";
const GPT_PARTITION_ENTRY_SIZE: usize = 128;
const GPT_PARTITION_NAME_SIZE: usize = 72;

/// ACPI `_HID` of a PCI root bridge (`PNP0A03`), in its compressed EISA form.
const ACPI_PCI_ROOT_HID: u32 = 0x0a03_41d0;

/// Reads `count` UTF-16 code units whose count was read from the payload itself.
fn take_utf16_chars<'a>(
    cursor: &mut ByteCursor<'a>,
    count: u64,
    what: &'static str,
) -> DecodeResult<&'a [u8]> {
    let len = count
        .checked_mul(2)
        .ok_or_else(|| DecodeError::invalid(what, cursor.pos(), "length overflows"))?;
    cursor.take_bytes_u64(len, what)
}

/// `UEFI_VARIABLE_DATA`, measured by `EV_EFI_VARIABLE_*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EfiVariableData {
    pub variable_name: Guid,
    pub unicode_name: String,
    #[serde(serialize_with = "serialize_as_hex")]
    pub variable_data: Vec<u8>,
}

impl EfiVariableData {
    pub(crate) fn decode(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let variable_name = Guid::read(cursor, "VariableName")?;
        let name_chars = cursor.u64("UnicodeNameLength")?;
        let data_len = cursor.u64("VariableDataLength")?;

        let name_offset = cursor.pos();
        let name = take_utf16_chars(cursor, name_chars, "UnicodeName")?;
        let unicode_name = decode_utf16le_z(name, "UnicodeName", name_offset)?;

        let variable_data = cursor.take_bytes_u64(data_len, "VariableData")?.to_vec();

        Ok(EfiVariableData {
            variable_name,
            unicode_name,
            variable_data,
        })
    }
}

impl Display for EfiVariableData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "UEFI_VARIABLE_DATA{{ VariableName: {}, UnicodeName: \"{}\", VariableDataLength: {} }}",
            self.variable_name,
            self.unicode_name,
            self.variable_data.len()
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionFormat {
    Mbr,
    Gpt,
    Unknown(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionSignature {
    None,
    Mbr(u32),
    Guid(Guid),
    Unknown(u8),
}

/// A single node of an EFI device path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum DevicePathNode {
    Pci {
        function: u8,
        device: u8,
    },
    Acpi {
        hid: u32,
        uid: u32,
    },
    HardDrive {
        partition_number: u32,
        partition_start: u64,
        partition_size: u64,
        format: PartitionFormat,
        signature: PartitionSignature,
    },
    FilePath {
        path: String,
    },
    EndInstance,
    /// Nodes without a dedicated representation.
    Other {
        node_type: u8,
        sub_type: u8,
        #[serde(serialize_with = "serialize_as_hex")]
        data: Vec<u8>,
    },
}

impl DevicePathNode {
    fn expect_len(data: &[u8], len: usize, what: &'static str, offset: usize) -> DecodeResult<()> {
        if data.len() != len {
            return Err(DecodeError::invalid(
                what,
                offset,
                format!("expected {} bytes of node data, found {}", len, data.len()),
            ));
        }
        Ok(())
    }

    fn decode(node_type: u8, sub_type: u8, data: &[u8], offset: usize) -> DecodeResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let node = match (node_type, sub_type) {
            (0x01, 0x01) => {
                Self::expect_len(data, 2, "PCI device path node", offset)?;
                DevicePathNode::Pci {
                    function: cursor.u8("Function")?,
                    device: cursor.u8("Device")?,
                }
            }
            (0x02, 0x01) => {
                Self::expect_len(data, 8, "ACPI device path node", offset)?;
                DevicePathNode::Acpi {
                    hid: cursor.u32("HID")?,
                    uid: cursor.u32("UID")?,
                }
            }
            (0x04, 0x01) => {
                Self::expect_len(data, 38, "hard drive device path node", offset)?;
                let partition_number = cursor.u32("PartitionNumber")?;
                let partition_start = cursor.u64("PartitionStart")?;
                let partition_size = cursor.u64("PartitionSize")?;
                let raw_signature = cursor.array::<16>("PartitionSignature")?;
                let format = match cursor.u8("PartitionFormat")? {
                    0x01 => PartitionFormat::Mbr,
                    0x02 => PartitionFormat::Gpt,
                    other => PartitionFormat::Unknown(other),
                };
                let signature = match cursor.u8("SignatureType")? {
                    0x00 => PartitionSignature::None,
                    0x01 => PartitionSignature::Mbr(u32::from_le_bytes([
                        raw_signature[0],
                        raw_signature[1],
                        raw_signature[2],
                        raw_signature[3],
                    ])),
                    0x02 => {
                        let mut sig = ByteCursor::new(&raw_signature);
                        PartitionSignature::Guid(Guid::read(&mut sig, "PartitionSignature")?)
                    }
                    other => PartitionSignature::Unknown(other),
                };
                DevicePathNode::HardDrive {
                    partition_number,
                    partition_start,
                    partition_size,
                    format,
                    signature,
                }
            }
            (0x04, 0x04) => DevicePathNode::FilePath {
                path: decode_utf16le_z(data, "file path device path node", offset)?,
            },
            (0x7f, 0x01) => DevicePathNode::EndInstance,
            _ => DevicePathNode::Other {
                node_type,
                sub_type,
                data: data.to_vec(),
            },
        };
        Ok(node)
    }
}

impl Display for DevicePathNode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DevicePathNode::Pci { function, device } => {
                write!(f, "Pci(0x{:x},0x{:x})", device, function)
            }
            DevicePathNode::Acpi { hid, uid } if *hid == ACPI_PCI_ROOT_HID => {
                write!(f, "PciRoot(0x{:x})", uid)
            }
            DevicePathNode::Acpi { hid, uid } => write!(f, "Acpi(0x{:08x},0x{:x})", hid, uid),
            DevicePathNode::HardDrive {
                partition_number,
                partition_start,
                partition_size,
                format,
                signature,
            } => {
                write!(f, "HD({},", partition_number)?;
                match format {
                    PartitionFormat::Mbr => f.write_str("MBR,")?,
                    PartitionFormat::Gpt => f.write_str("GPT,")?,
                    PartitionFormat::Unknown(v) => write!(f, "{},", v)?,
                }
                match signature {
                    PartitionSignature::None => f.write_str("0")?,
                    PartitionSignature::Mbr(sig) => write!(f, "0x{:08x}", sig)?,
                    PartitionSignature::Guid(guid) => write!(f, "{}", guid)?,
                    PartitionSignature::Unknown(v) => write!(f, "?{}", v)?,
                }
                write!(f, ",0x{:x},0x{:x})", partition_start, partition_size)
            }
            DevicePathNode::FilePath { path } => f.write_str(path),
            DevicePathNode::EndInstance => f.write_str(","),
            DevicePathNode::Other {
                node_type,
                sub_type,
                data,
            } => write!(f, "Path({},{},{})", node_type, sub_type, hex::encode(data)),
        }
    }
}

/// An EFI device path. The terminating end-of-path node is not stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct DevicePath(pub Vec<DevicePathNode>);

impl DevicePath {
    pub(crate) fn decode(data: &[u8], base_offset: usize) -> DecodeResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let mut nodes = Vec::new();

        while !cursor.is_empty() {
            let node_offset = base_offset + cursor.pos();
            let node_type = cursor.u8("device path node type")?;
            let sub_type = cursor.u8("device path node sub-type")?;
            let length = usize::from(cursor.u16("device path node length")?);
            if length < 4 {
                return Err(DecodeError::invalid(
                    "device path node length",
                    node_offset,
                    format!("node length {} is smaller than the node header", length),
                ));
            }

            let node_data = cursor.take_bytes(length - 4, "device path node data")?;
            if (node_type, sub_type) == (0x7f, 0xff) {
                break;
            }
            nodes.push(DevicePathNode::decode(
                node_type,
                sub_type,
                node_data,
                node_offset + 4,
            )?);
        }

        Ok(DevicePath(nodes))
    }
}

impl Display for DevicePath {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut first = true;
        for node in &self.0 {
            if let DevicePathNode::EndInstance = node {
                f.write_str(",")?;
                first = true;
                continue;
            }
            if !first {
                f.write_str("/")?;
            }
            write!(f, "{}", node)?;
            first = false;
        }
        Ok(())
    }
}

/// `UEFI_IMAGE_LOAD_EVENT`, measured for every PE image loaded by firmware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EfiImageLoadEvent {
    pub image_location_in_memory: u64,
    pub image_length_in_memory: u64,
    pub image_link_time_address: u64,
    pub device_path: DevicePath,
}

impl EfiImageLoadEvent {
    pub(crate) fn decode(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let image_location_in_memory = cursor.u64("ImageLocationInMemory")?;
        let image_length_in_memory = cursor.u64("ImageLengthInMemory")?;
        let image_link_time_address = cursor.u64("ImageLinkTimeAddress")?;
        let device_path_len = cursor.u64("LengthOfDevicePath")?;
        let offset = cursor.pos();
        let path = cursor.take_bytes_u64(device_path_len, "DevicePath")?;

        Ok(EfiImageLoadEvent {
            image_location_in_memory,
            image_length_in_memory,
            image_link_time_address,
            device_path: DevicePath::decode(path, offset)?,
        })
    }
}

impl Display for EfiImageLoadEvent {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "UEFI_IMAGE_LOAD_EVENT{{ ImageLocationInMemory: 0x{:016x}, ImageLengthInMemory: {}, ImageLinkTimeAddress: 0x{:016x}, DevicePath: {} }}",
            self.image_location_in_memory,
            self.image_length_in_memory,
            self.image_link_time_address,
            self.device_path
        )
    }
}

/// `UEFI_PLATFORM_FIRMWARE_BLOB`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct EfiPlatformFirmwareBlob {
    pub blob_base: u64,
    pub blob_length: u64,
}

impl EfiPlatformFirmwareBlob {
    pub(crate) fn decode(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        Ok(EfiPlatformFirmwareBlob {
            blob_base: cursor.u64("BlobBase")?,
            blob_length: cursor.u64("BlobLength")?,
        })
    }
}

impl Display for EfiPlatformFirmwareBlob {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "UEFI_PLATFORM_FIRMWARE_BLOB{{ BlobBase: 0x{:x}, BlobLength: {} }}",
            self.blob_base, self.blob_length
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct EfiConfigurationTable {
    pub vendor_guid: Guid,
    pub vendor_table: u64,
}

/// `UEFI_HANDOFF_TABLE_POINTERS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EfiHandoffTables {
    pub tables: Vec<EfiConfigurationTable>,
}

impl EfiHandoffTables {
    pub(crate) fn decode(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let count = cursor.u64("NumberOfTables")?;
        // The count comes from the payload, so it does not bound the allocation.
        let mut tables = Vec::with_capacity(cursor.remaining() / 24);
        for _ in 0..count {
            tables.push(EfiConfigurationTable {
                vendor_guid: Guid::read(cursor, "VendorGuid")?,
                vendor_table: cursor.u64("VendorTable")?,
            });
        }
        Ok(EfiHandoffTables { tables })
    }
}

impl Display for EfiHandoffTables {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("UEFI_HANDOFF_TABLE_POINTERS{ TableEntry: [")?;
        for (i, t) in self.tables.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(
                f,
                " {{ VendorGuid: {}, VendorTable: 0x{:x} }}",
                t.vendor_guid, t.vendor_table
            )?;
        }
        f.write_str(" ] }")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub my_lba: u64,
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Guid,
    pub partition_entry_lba: u64,
    pub number_of_partition_entries: u32,
    pub size_of_partition_entry: u32,
    pub partition_entry_array_crc32: u32,
}

impl GptHeader {
    fn decode(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let signature_offset = cursor.pos();
        let signature = cursor.array::<8>("GPT header signature")?;
        if &signature != GPT_HEADER_SIGNATURE {
            return Err(DecodeError::UnexpectedValue {
                what: "GPT header signature",
                offset: signature_offset as u64,
                value: u64::from_le_bytes(signature),
            });
        }

        let revision = cursor.u32("Revision")?;
        let header_size = cursor.u32("HeaderSize")?;
        let header_crc32 = cursor.u32("HeaderCRC32")?;
        let _reserved = cursor.u32("Reserved")?;

        Ok(GptHeader {
            revision,
            header_size,
            header_crc32,
            my_lba: cursor.u64("MyLBA")?,
            alternate_lba: cursor.u64("AlternateLBA")?,
            first_usable_lba: cursor.u64("FirstUsableLBA")?,
            last_usable_lba: cursor.u64("LastUsableLBA")?,
            disk_guid: Guid::read(cursor, "DiskGUID")?,
            partition_entry_lba: cursor.u64("PartitionEntryLBA")?,
            number_of_partition_entries: cursor.u32("NumberOfPartitionEntries")?,
            size_of_partition_entry: cursor.u32("SizeOfPartitionEntry")?,
            partition_entry_array_crc32: cursor.u32("PartitionEntryArrayCRC32")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GptPartitionEntry {
    pub partition_type_guid: Guid,
    pub unique_partition_guid: Guid,
    pub starting_lba: u64,
    pub ending_lba: u64,
    pub attributes: u64,
    pub partition_name: String,
}

impl GptPartitionEntry {
    fn decode(cursor: &mut ByteCursor, entry_size: usize) -> DecodeResult<Self> {
        let entry = cursor.take_bytes(entry_size, "GPT partition entry")?;
        let base = cursor.pos() - entry_size;
        let mut entry = ByteCursor::new(entry);

        let partition_type_guid = Guid::read(&mut entry, "PartitionTypeGUID")?;
        let unique_partition_guid = Guid::read(&mut entry, "UniquePartitionGUID")?;
        let starting_lba = entry.u64("StartingLBA")?;
        let ending_lba = entry.u64("EndingLBA")?;
        let attributes = entry.u64("Attributes")?;
        let name_offset = base + entry.pos();
        let name = entry.take_bytes(GPT_PARTITION_NAME_SIZE, "PartitionName")?;

        Ok(GptPartitionEntry {
            partition_type_guid,
            unique_partition_guid,
            starting_lba,
            ending_lba,
            attributes,
            partition_name: decode_utf16le_z(name, "PartitionName", name_offset)?,
        })
    }
}

/// `UEFI_GPT_DATA`, measured by `EV_EFI_GPT_EVENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EfiGptData {
    pub header: GptHeader,
    pub partitions: Vec<GptPartitionEntry>,
}

impl EfiGptData {
    pub(crate) fn decode(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let header = GptHeader::decode(cursor)?;

        let entry_size = header.size_of_partition_entry as usize;
        if entry_size < GPT_PARTITION_ENTRY_SIZE {
            return Err(DecodeError::invalid(
                "SizeOfPartitionEntry",
                cursor.pos(),
                format!(
                    "partition entries must be at least {} bytes, header declares {}",
                    GPT_PARTITION_ENTRY_SIZE, entry_size
                ),
            ));
        }

        let count = cursor.u64("NumberOfPartitions")?;
        let mut partitions = Vec::with_capacity(cursor.remaining() / entry_size);
        for _ in 0..count {
            partitions.push(GptPartitionEntry::decode(cursor, entry_size)?);
        }

        Ok(EfiGptData { header, partitions })
    }
}

impl Display for EfiGptData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "UEFI_GPT_DATA{{ DiskGUID: {}, Partitions: [", self.header.disk_guid)?;
        for (i, p) in self.partitions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(
                f,
                " {{ PartitionTypeGUID: {}, UniquePartitionGUID: {}, Name: \"{}\" }}",
                p.partition_type_guid, p.unique_partition_guid, p.partition_name
            )?;
        }
        f.write_str(" ] }")
    }
}
