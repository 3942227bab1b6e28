use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::geometry::RingPolicy;
use crate::source::SourceMode;

/// Optional YAML settings; command line flags extend or override them.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub include_placetypes: Vec<String>,
    #[serde(default)]
    pub exclude_placetypes: Vec<String>,
    #[serde(default)]
    pub belongs_to: Vec<i64>,
    #[serde(default)]
    pub shapetype: Option<String>,
    #[serde(default)]
    pub mode: Option<SourceMode>,
    #[serde(default)]
    pub dates: Option<bool>,
    #[serde(default)]
    pub rings: Option<RingPolicy>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Which records make it into the shapefile.
#[derive(Debug, Default, Clone)]
pub struct FiltersConfig {
    pub include_placetypes: HashSet<String>,
    pub exclude_placetypes: HashSet<String>,
    /// A record passes if it belongs to any of these.
    pub belongs_to: Vec<i64>,
}

impl FiltersConfig {
    pub fn is_empty(&self) -> bool {
        self.include_placetypes.is_empty()
            && self.exclude_placetypes.is_empty()
            && self.belongs_to.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_settings() {
        let file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        std::fs::write(
            file.path(),
            r#"
include_placetypes: [locality, localadmin]
belongs_to: [85633793]
shapetype: polygon
mode: repo
dates: false
rings: reject
"#,
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.include_placetypes, ["locality", "localadmin"]);
        assert!(config.exclude_placetypes.is_empty());
        assert_eq!(config.belongs_to, [85633793]);
        assert_eq!(config.shapetype.as_deref(), Some("polygon"));
        assert_eq!(config.mode, Some(SourceMode::Directory));
        assert_eq!(config.dates, Some(false));
        assert_eq!(config.rings, Some(RingPolicy::Reject));
    }
}
