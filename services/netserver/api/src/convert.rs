//! String representations of the shared enums.
//!
//! These are the spellings used in region configuration files and log
//! output, which differ from the protobuf enum names (`"AS923_2"`,
//! `"1.0.3"`, `"RP002_1.0.3"`).

use crate::common::{MType, MacVersion, Region, RegParamsRevision};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string does not name a known enum value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseEnumError {
    /// Unknown region name
    #[error("invalid region: {0}")]
    Region(String),
    /// Unknown LoRaWAN MAC version
    #[error("invalid mac-version: {0}")]
    MacVersion(String),
    /// Unknown regional parameters revision
    #[error("invalid reg param revision: {0}")]
    RegParamsRevision(String),
}

impl Region {
    /// Configuration name of the region
    pub fn name(&self) -> &'static str {
        match self {
            Region::Eu868 => "EU868",
            Region::Us915 => "US915",
            Region::Cn779 => "CN779",
            Region::Eu433 => "EU433",
            Region::Au915 => "AU915",
            Region::Cn470 => "CN470",
            Region::As923 => "AS923",
            Region::As9232 => "AS923_2",
            Region::As9233 => "AS923_3",
            Region::As9234 => "AS923_4",
            Region::Kr920 => "KR920",
            Region::In865 => "IN865",
            Region::Ru864 => "RU864",
            Region::Ism2400 => "ISM2400",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Region {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EU868" => Region::Eu868,
            "US915" => Region::Us915,
            "CN779" => Region::Cn779,
            "EU433" => Region::Eu433,
            "AU915" => Region::Au915,
            "CN470" => Region::Cn470,
            "AS923" => Region::As923,
            "AS923_2" => Region::As9232,
            "AS923_3" => Region::As9233,
            "AS923_4" => Region::As9234,
            "KR920" => Region::Kr920,
            "IN865" => Region::In865,
            "RU864" => Region::Ru864,
            "ISM2400" => Region::Ism2400,
            _ => return Err(ParseEnumError::Region(s.to_string())),
        })
    }
}

impl MacVersion {
    /// Dotted version string, e.g. `1.0.3`
    pub fn name(&self) -> &'static str {
        match self {
            MacVersion::Lorawan100 => "1.0.0",
            MacVersion::Lorawan101 => "1.0.1",
            MacVersion::Lorawan102 => "1.0.2",
            MacVersion::Lorawan103 => "1.0.3",
            MacVersion::Lorawan104 => "1.0.4",
            MacVersion::Lorawan110 => "1.1.0",
        }
    }
}

impl fmt::Display for MacVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MacVersion {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "1.0.0" => MacVersion::Lorawan100,
            "1.0.1" => MacVersion::Lorawan101,
            "1.0.2" => MacVersion::Lorawan102,
            "1.0.3" => MacVersion::Lorawan103,
            "1.0.4" => MacVersion::Lorawan104,
            "1.1.0" => MacVersion::Lorawan110,
            _ => return Err(ParseEnumError::MacVersion(s.to_string())),
        })
    }
}

impl RegParamsRevision {
    /// Revision name, e.g. `RP002_1.0.3`
    pub fn name(&self) -> &'static str {
        match self {
            RegParamsRevision::A => "A",
            RegParamsRevision::B => "B",
            RegParamsRevision::Rp002100 => "RP002_1.0.0",
            RegParamsRevision::Rp002101 => "RP002_1.0.1",
            RegParamsRevision::Rp002102 => "RP002_1.0.2",
            RegParamsRevision::Rp002103 => "RP002_1.0.3",
        }
    }
}

impl fmt::Display for RegParamsRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegParamsRevision {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "A" => RegParamsRevision::A,
            "B" => RegParamsRevision::B,
            "RP002_1.0.0" => RegParamsRevision::Rp002100,
            "RP002_1.0.1" => RegParamsRevision::Rp002101,
            "RP002_1.0.2" => RegParamsRevision::Rp002102,
            "RP002_1.0.3" => RegParamsRevision::Rp002103,
            _ => return Err(ParseEnumError::RegParamsRevision(s.to_string())),
        })
    }
}

impl MType {
    /// Frame type as shown in frame logs
    pub fn name(&self) -> &'static str {
        match self {
            MType::JoinRequest => "JoinRequest",
            MType::JoinAccept => "JoinAccept",
            MType::UnconfirmedDataUp => "UnconfirmedDataUp",
            MType::UnconfirmedDataDown => "UnconfirmedDataDown",
            MType::ConfirmedDataUp => "ConfirmedDataUp",
            MType::ConfirmedDataDown => "ConfirmedDataDown",
            MType::RejoinRequest => "RejoinRequest",
            MType::Proprietary => "Proprietary",
        }
    }
}

impl fmt::Display for MType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGIONS: [Region; 14] = [
        Region::Eu868,
        Region::Us915,
        Region::Cn779,
        Region::Eu433,
        Region::Au915,
        Region::Cn470,
        Region::As923,
        Region::As9232,
        Region::As9233,
        Region::As9234,
        Region::Kr920,
        Region::In865,
        Region::Ru864,
        Region::Ism2400,
    ];

    #[test]
    fn test_region_names_parse_back() {
        for region in REGIONS {
            assert_eq!(region.to_string().parse::<Region>().unwrap(), region);
        }
    }

    #[test]
    fn test_region_name_differs_from_proto_name() {
        assert_eq!(Region::As9232.name(), "AS923_2");
        assert_eq!(Region::As9232.as_str_name(), "AS923_2");
        assert_eq!(Region::Eu868.name(), "EU868");
    }

    #[test]
    fn test_unknown_region() {
        let err = "EU999".parse::<Region>().unwrap_err();
        assert_eq!(err, ParseEnumError::Region("EU999".to_string()));
        assert_eq!(err.to_string(), "invalid region: EU999");
    }

    #[test]
    fn test_mac_version() {
        assert_eq!("1.0.3".parse::<MacVersion>().unwrap(), MacVersion::Lorawan103);
        assert_eq!(MacVersion::Lorawan110.to_string(), "1.1.0");
        assert!("1.2.0".parse::<MacVersion>().is_err());
    }

    #[test]
    fn test_reg_params_revision() {
        assert_eq!(
            "RP002_1.0.3".parse::<RegParamsRevision>().unwrap(),
            RegParamsRevision::Rp002103
        );
        assert_eq!(RegParamsRevision::B.to_string(), "B");
        assert!("RP002_1_0_3".parse::<RegParamsRevision>().is_err());
    }

    #[test]
    fn test_mtype_display() {
        assert_eq!(MType::UnconfirmedDataUp.to_string(), "UnconfirmedDataUp");
        assert_eq!(MType::Proprietary.to_string(), "Proprietary");
    }
}
