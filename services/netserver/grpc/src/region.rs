//! Region configuration and the region RPCs of the internal service

use crate::config::ApiConfig;
use ns_api::api;
use ns_api::common::Region;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tonic::Status;
use tracing::warn;

/// Configured region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Region id, unique within the configuration
    pub id: String,
    /// Human readable description
    pub description: String,
    /// Regional parameters name, e.g. `EU868`
    pub common_name: String,
    /// Free-form information shown to users
    pub user_info: String,
    /// RX1 delay (seconds)
    pub rx1_delay: u32,
    /// RX1 data-rate offset
    pub rx1_dr_offset: u32,
    /// RX2 data-rate
    pub rx2_dr: u32,
    /// RX2 frequency (Hz)
    pub rx2_frequency: u32,
    /// Class-B ping-slot data-rate
    pub class_b_ping_slot_dr: u32,
    /// Class-B ping-slot frequency (Hz)
    pub class_b_ping_slot_frequency: u32,
    /// Uplink channels
    pub uplink_channels: Vec<ChannelConfig>,
}

/// Uplink channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Frequency (Hz)
    pub frequency: u32,
    /// Minimum data-rate
    pub min_dr: u32,
    /// Maximum data-rate
    pub max_dr: u32,
    /// Channel is in use
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RegionConfig {
    /// Regional parameters of this region
    pub fn region(&self) -> Result<Region, Status> {
        Region::from_str(&self.common_name).map_err(|e| {
            Status::internal(format!("region {} has {}", self.id, e))
        })
    }

    fn description_or_id(&self) -> String {
        if self.description.is_empty() {
            self.id.clone()
        } else {
            self.description.clone()
        }
    }
}

/// Enabled regions, sorted by id
pub fn list_regions(config: &ApiConfig) -> Result<api::ListRegionsResponse, Status> {
    let mut regions = Vec::with_capacity(config.enabled_regions.len());

    for id in &config.enabled_regions {
        let conf = match config.regions.iter().find(|r| &r.id == id) {
            Some(c) => c,
            None => {
                warn!(region_id = %id, "Enabled region has no configuration");
                continue;
            }
        };

        regions.push(api::RegionListItem {
            id: conf.id.clone(),
            region: conf.region()? as i32,
            description: conf.description_or_id(),
        });
    }

    regions.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(api::ListRegionsResponse { regions })
}

/// Details of an enabled region
pub fn get_region(config: &ApiConfig, id: &str) -> Result<api::GetRegionResponse, Status> {
    let conf = config
        .enabled_region(id)
        .ok_or_else(|| Status::not_found(format!("region {} does not exist", id)))?;

    Ok(api::GetRegionResponse {
        id: conf.id.clone(),
        region: conf.region()? as i32,
        user_info: conf.user_info.clone(),
        uplink_channels: conf
            .uplink_channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| api::RegionChannel {
                frequency: c.frequency,
                dr_min: c.min_dr,
                dr_max: c.max_dr,
            })
            .collect(),
        rx1_delay: conf.rx1_delay,
        rx1_dr_offset: conf.rx1_dr_offset,
        rx2_dr: conf.rx2_dr,
        rx2_frequency: conf.rx2_frequency,
        class_b_ping_slot_dr: conf.class_b_ping_slot_dr,
        class_b_ping_slot_frequency: conf.class_b_ping_slot_frequency,
        description: conf.description_or_id(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn config() -> ApiConfig {
        let regions: Vec<RegionConfig> = serde_yaml::from_str(
            r#"
- id: us915_0
  common_name: US915
  uplink_channels:
    - frequency: 902300000
      min_dr: 0
      max_dr: 3
- id: eu868
  description: EU868 default
  common_name: EU868
  user_info: Shared EU network
  rx1_delay: 1
  rx2_dr: 0
  rx2_frequency: 869525000
  uplink_channels:
    - frequency: 868100000
      min_dr: 0
      max_dr: 5
    - frequency: 868300000
      min_dr: 0
      max_dr: 5
      enabled: false
- id: as923
  common_name: AS923
"#,
        )
        .unwrap();

        ApiConfig {
            enabled_regions: vec!["us915_0".into(), "eu868".into(), "missing".into()],
            regions,
            ..Default::default()
        }
    }

    #[test]
    fn test_list_regions() {
        let resp = list_regions(&config()).unwrap();
        assert_eq!(
            resp.regions,
            vec![
                api::RegionListItem {
                    id: "eu868".into(),
                    region: Region::Eu868 as i32,
                    description: "EU868 default".into(),
                },
                api::RegionListItem {
                    id: "us915_0".into(),
                    region: Region::Us915 as i32,
                    description: "us915_0".into(),
                },
            ]
        );
    }

    #[test]
    fn test_get_region() {
        let resp = get_region(&config(), "eu868").unwrap();
        assert_eq!(resp.region, Region::Eu868 as i32);
        assert_eq!(resp.user_info, "Shared EU network");
        assert_eq!(resp.rx2_frequency, 869525000);
        assert_eq!(
            resp.uplink_channels,
            vec![api::RegionChannel {
                frequency: 868100000,
                dr_min: 0,
                dr_max: 5,
            }]
        );
    }

    #[test]
    fn test_get_region_not_enabled() {
        for id in ["as923", "missing", "nope"] {
            assert_eq!(
                get_region(&config(), id).unwrap_err().code(),
                Code::NotFound,
                "{}",
                id
            );
        }
    }

    #[test]
    fn test_invalid_common_name() {
        let mut conf = config();
        conf.regions[1].common_name = "EU999".into();
        assert_eq!(list_regions(&conf).unwrap_err().code(), Code::Internal);
    }
}
