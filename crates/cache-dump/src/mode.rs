use crate::config::RunConfig;

/// How the maps of a store are rendered. Chosen once per file from the
/// configuration in effect for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// Per map counts and length sums, no key decomposition.
    Statistics,
    /// `map|key|value` for every entry.
    Raw,
    /// Decoded keys with the length of each value.
    DecodedLengths,
    /// Decoded keys with the value itself.
    DecodedValues,
}

impl DumpMode {
    pub fn select(config: &RunConfig) -> Self {
        if config.dump_map {
            DumpMode::Raw
        } else if config.map.is_empty() && config.path.is_empty() && config.revision.is_empty() {
            DumpMode::Statistics
        } else if config.values {
            DumpMode::DecodedValues
        } else {
            DumpMode::DecodedLengths
        }
    }

    /// The column header written once per file, before any map.
    pub fn header(self) -> Option<&'static str> {
        match self {
            DumpMode::Statistics | DumpMode::Raw => None,
            DumpMode::DecodedLengths => Some("map,path,revision,p2,length"),
            DumpMode::DecodedValues => Some("map,path,revision,p2,value"),
        }
    }
}
