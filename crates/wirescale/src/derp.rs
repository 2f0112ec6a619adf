//! relay map loading.
//!
//! the relay map is static for the life of the process and is served to
//! nodes verbatim in every full map response.

use wirescale_proto::{DerpMap, DerpNode, DerpRegion};
use wirescale_types::DerpConfig;

/// build the relay map from config.
///
/// a json map file wins when configured; otherwise a single fallback
/// region is synthesised from the config fields, and an empty map is
/// served when neither is present.
pub fn load_derp_map(config: &DerpConfig) -> std::io::Result<DerpMap> {
    if let Some(path) = &config.derp_map_path {
        let contents = std::fs::read_to_string(path)?;
        let map: DerpMap = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        return Ok(map);
    }

    let mut map = DerpMap::default();
    if let Some(host) = &config.fallback_region_host {
        let region_id = if config.fallback_region_id > 0 {
            config.fallback_region_id
        } else {
            999
        };
        map.regions.insert(
            region_id,
            DerpRegion {
                region_id,
                region_code: "fallback".to_string(),
                region_name: "Fallback".to_string(),
                nodes: vec![DerpNode {
                    name: format!("{region_id}a"),
                    region_id,
                    host_name: host.clone(),
                    ..Default::default()
                }],
            },
        );
    }
    Ok(map)
}
