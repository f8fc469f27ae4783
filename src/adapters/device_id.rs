//! Device identity derived from the ESP32 factory MAC address.
//!
//! The softAP SSID must be stable across reboots so a user's phone keeps
//! recognising the device. It is derived once at boot from the 64-bit
//! factory eFuse identifier: `SquareDose-` followed by bits 32..47 as
//! uppercase hex (e.g. `SquareDose-BEEF`).

/// AP SSID string: prefix + 4 hex digits fits comfortably in 24.
pub type ApSsidString = heapless::String<24>;

/// Full 6-byte factory MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the AP SSID from the chip identifier.
///
/// The 6-byte MAC is widened to the 64-bit eFuse value the same way the
/// hardware reports it (big-endian in the low 48 bits); bits 32..47 are the
/// two highest MAC bytes.
pub fn ap_ssid(mac: &MacAddress) -> ApSsidString {
    let chip = ((mac[0] as u16) << 8) | mac[1] as u16;
    let mut ssid = ApSsidString::new();
    use core::fmt::Write;
    let _ = write!(ssid, "{}{:04X}", crate::config::AP_SSID_PREFIX, chip);
    ssid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ap_ssid_format() {
        let mac = [0xAB, 0xCD, 0x22, 0x33, 0x44, 0x55];
        assert_eq!(ap_ssid(&mac).as_str(), "SquareDose-ABCD");
    }

    #[test]
    fn ap_ssid_is_uppercase_hex() {
        let mac = [0xde, 0xad, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(ap_ssid(&mac).as_str(), "SquareDose-DEAD");
    }

    #[test]
    fn sim_mac_deterministic() {
        assert_eq!(read_mac(), read_mac());
        assert_eq!(ap_ssid(&read_mac()), ap_ssid(&read_mac()));
    }
}
