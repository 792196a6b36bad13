//! Loads the two optional override files (§6): `run_instances_overrides.json`
//! and `create_fleet_overrides.json`. Each is keyed `queue -> compute_resource
//! -> {fields to shallow-merge into the API request}`; a missing file is not
//! an error, it just means no overrides apply (§4.1 "Overrides").

use std::collections::HashMap;
use std::path::Path;

use cloud_traits::FleetOverrides;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct OverridesFile {
    queues: HashMap<String, HashMap<String, FleetOverrides>>,
}

impl OverridesFile {
    /// Missing file -> empty overrides. Malformed JSON is logged and
    /// treated as empty rather than failing the whole daemon, since an
    /// override file is an operator convenience, not load-bearing config.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => {
                debug!(path = %path.display(), "no overrides file present");
                return Self::default();
            }
        };
        match serde_json::from_str(&data) {
            Ok(queues) => Self { queues },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed overrides file");
                Self::default()
            }
        }
    }

    pub fn for_group(&self, queue: &str, compute_resource: &str) -> FleetOverrides {
        self.queues
            .get(queue)
            .and_then(|crs| crs.get(compute_resource))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_empty_overrides() {
        let overrides = OverridesFile::load(Path::new("/nonexistent/overrides.json"));
        assert!(overrides.for_group("queue1", "cr1").fields.is_empty());
    }

    #[test]
    fn loads_and_looks_up_nested_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"queue1": {{"cr1": {{"KeyName": "my-key"}}}}}}"#
        )
        .unwrap();
        let overrides = OverridesFile::load(file.path());
        let group = overrides.for_group("queue1", "cr1");
        assert_eq!(
            group.fields.get("KeyName").and_then(|v| v.as_str()),
            Some("my-key")
        );
        assert!(overrides.for_group("queue1", "missing").fields.is_empty());
    }
}
