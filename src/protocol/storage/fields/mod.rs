//! Product data every node keeps at fixed EEPROM locations.
//!
//! ```text
//! page 0, offset  0 : status byte
//! page 0, offset  1 : name            (8 bytes, NUL padded ASCII)
//! page 4, offset  0 : GTIN            (8 bytes, little endian)
//! page 4, offset 13 : hardware version (major, minor, patch)
//! page 4, offset 21 : firmware version (major, minor, patch)
//! page 4, offset 24 : release name    (8 bytes, NUL padded ASCII)
//! ```
use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::Eeprom;
use crate::error::StorageError;
use crate::protocol::transport::traits::bus_timer::BusTimer;

const SYSTEM_PAGE: u8 = 0;
const PRODUCT_PAGE: u8 = 4;

const STATUS_OFFSET: u8 = 0;
const NAME_OFFSET: u8 = 1;
const GTIN_OFFSET: u8 = 0;
const HARDWARE_VERSION_OFFSET: u8 = 13;
const FIRMWARE_VERSION_OFFSET: u8 = 21;
const RELEASE_NAME_OFFSET: u8 = 24;

/// Bytes reserved for the node name and the firmware release name.
pub const NAME_LENGTH: usize = 8;

//==================================================================================STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Status byte at the start of the EEPROM. Values other than the two known
/// markers are kept as read.
pub struct EepromStatus(pub u8);

impl EepromStatus {
    pub const INITIALIZED: Self = Self(0xAC);
    /// Locked EEPROMs refuse further writes.
    pub const LOCKED: Self = Self(0xCA);

    pub fn is_initialized(&self) -> bool {
        *self == Self::INITIALIZED
    }

    pub fn is_locked(&self) -> bool {
        *self == Self::LOCKED
    }
}

impl fmt::Display for EepromStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INITIALIZED => f.write_str("Initialized"),
            Self::LOCKED => f.write_str("Locked"),
            Self(other) => write!(f, "Unknown (0x{:02X})", other),
        }
    }
}

//==================================================================================VERSION
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Three-part hardware or firmware version, one byte per part.
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

//==================================================================================ACCESSORS
impl<M: RawMutex, T: BusTimer, const SLOTS: usize> Eeprom<'_, M, T, SLOTS> {
    pub async fn read_status(&self) -> Result<EepromStatus, StorageError> {
        let mut byte = [0u8; 1];
        self.read(SYSTEM_PAGE, STATUS_OFFSET, &mut byte).await?;
        Ok(EepromStatus(byte[0]))
    }

    pub async fn write_status(&self, status: EepromStatus) -> Result<(), StorageError> {
        self.write(SYSTEM_PAGE, STATUS_OFFSET, &[status.0], None).await
    }

    /// Node name (the advertised Bluetooth name for sensor nodes).
    pub async fn read_name<'b>(
        &self,
        buffer: &'b mut [u8; NAME_LENGTH],
    ) -> Result<&'b str, StorageError> {
        self.read_text(SYSTEM_PAGE, NAME_OFFSET, buffer).await
    }

    /// Longer names are cut to [`NAME_LENGTH`] bytes, shorter ones NUL padded.
    pub async fn write_name(&self, name: &str) -> Result<(), StorageError> {
        self.write_text(SYSTEM_PAGE, NAME_OFFSET, name, Some(NAME_LENGTH))
            .await
    }

    /// Global Trade Item Number of the product.
    pub async fn read_gtin(&self) -> Result<u64, StorageError> {
        self.read_uint(PRODUCT_PAGE, GTIN_OFFSET, 8).await
    }

    pub async fn write_gtin(&self, gtin: u64) -> Result<(), StorageError> {
        self.write_uint(PRODUCT_PAGE, GTIN_OFFSET, gtin, 8).await
    }

    pub async fn read_hardware_version(&self) -> Result<Version, StorageError> {
        self.read_version(HARDWARE_VERSION_OFFSET).await
    }

    pub async fn write_hardware_version(&self, version: Version) -> Result<(), StorageError> {
        self.write(PRODUCT_PAGE, HARDWARE_VERSION_OFFSET, &version.to_bytes(), None)
            .await
    }

    pub async fn read_firmware_version(&self) -> Result<Version, StorageError> {
        self.read_version(FIRMWARE_VERSION_OFFSET).await
    }

    pub async fn write_firmware_version(&self, version: Version) -> Result<(), StorageError> {
        self.write(PRODUCT_PAGE, FIRMWARE_VERSION_OFFSET, &version.to_bytes(), None)
            .await
    }

    /// Release name of the installed firmware, e.g. `Valerie`.
    pub async fn read_release_name<'b>(
        &self,
        buffer: &'b mut [u8; NAME_LENGTH],
    ) -> Result<&'b str, StorageError> {
        self.read_text(PRODUCT_PAGE, RELEASE_NAME_OFFSET, buffer).await
    }

    async fn read_version(&self, offset: u8) -> Result<Version, StorageError> {
        let mut bytes = [0u8; 3];
        self.read(PRODUCT_PAGE, offset, &mut bytes).await?;
        Ok(Version::from_bytes(bytes))
    }
}
