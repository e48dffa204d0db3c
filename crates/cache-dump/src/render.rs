//! Output strategies, one per [`DumpMode`].
//!
//! A renderer is picked once per file. The runner calls
//! [`RenderMap::begin_map`], then [`RenderMap::entry`] for every entry in key
//! order, then [`RenderMap::end_map`].
use std::io::{self, Write};

use enum_dispatch::enum_dispatch;
use tracing::trace;

use crate::config::RunConfig;
use crate::key::{self, escape, KeyFilter};
use crate::mode::DumpMode;
use crate::store::Entry;

const RAW_DELIMITER: char = '|';
const CSV_DELIMITER: char = ',';

#[enum_dispatch]
pub trait RenderMap {
    /// `map` is the lower-cased map name.
    fn begin_map(&mut self, out: &mut dyn Write, map: &str) -> io::Result<()>;
    fn entry(&mut self, out: &mut dyn Write, entry: &Entry) -> io::Result<()>;
    fn end_map(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}

#[enum_dispatch(RenderMap)]
#[derive(Debug)]
pub enum Renderer {
    StatisticsRenderer,
    RawRenderer,
    LengthRenderer,
    ValueRenderer,
}

impl Renderer {
    pub fn new(mode: DumpMode, config: &RunConfig) -> Self {
        match mode {
            DumpMode::Statistics => StatisticsRenderer::default().into(),
            DumpMode::Raw => RawRenderer::default().into(),
            DumpMode::DecodedLengths => {
                LengthRenderer(DecodedRows::new(config.key_filter())).into()
            }
            DumpMode::DecodedValues => ValueRenderer(DecodedRows::new(config.key_filter())).into(),
        }
    }
}

/// Length in Unicode scalar values. Characters outside the BMP count once,
/// not as two UTF-16 units.
fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    pub entries: usize,
    pub key_length: usize,
    pub value_length: usize,
}

impl MapStats {
    pub fn add(&mut self, entry: &Entry) {
        self.entries += 1;
        self.key_length += char_len(&entry.key);
        self.value_length += char_len(&entry.value);
    }
}

/// Writes one block per map:
///
/// ```text
/// map: nodes
/// entries: 2
/// keyLength: 3
/// valueLength: 4
///
/// ```
#[derive(Debug, Default)]
pub struct StatisticsRenderer {
    map: String,
    stats: MapStats,
}

impl StatisticsRenderer {
    pub fn stats(&self) -> MapStats {
        self.stats
    }
}

impl RenderMap for StatisticsRenderer {
    fn begin_map(&mut self, _out: &mut dyn Write, map: &str) -> io::Result<()> {
        self.map = map.to_owned();
        self.stats = MapStats::default();
        Ok(())
    }

    fn entry(&mut self, _out: &mut dyn Write, entry: &Entry) -> io::Result<()> {
        self.stats.add(entry);
        Ok(())
    }

    fn end_map(&mut self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "map: {}", self.map)?;
        writeln!(out, "entries: {}", self.stats.entries)?;
        writeln!(out, "keyLength: {}", self.stats.key_length)?;
        writeln!(out, "valueLength: {}", self.stats.value_length)?;
        writeln!(out)
    }
}

/// `map|key|value`, with `|` inside any field replaced.
#[derive(Debug, Default)]
pub struct RawRenderer {
    map: String,
}

impl RenderMap for RawRenderer {
    fn begin_map(&mut self, _out: &mut dyn Write, map: &str) -> io::Result<()> {
        self.map = escape(map, RAW_DELIMITER).into_owned();
        Ok(())
    }

    fn entry(&mut self, out: &mut dyn Write, entry: &Entry) -> io::Result<()> {
        writeln!(
            out,
            "{}|{}|{}",
            self.map,
            escape(&entry.key, RAW_DELIMITER),
            escape(&entry.value, RAW_DELIMITER)
        )
    }
}

/// Shared part of the two decoded layouts: `map,path,revision,tag,<last>`.
#[derive(Debug)]
pub struct DecodedRows {
    map: String,
    filter: KeyFilter,
}

impl DecodedRows {
    fn new(filter: KeyFilter) -> Self {
        Self {
            map: String::new(),
            filter,
        }
    }

    fn begin(&mut self, map: &str) {
        self.map = escape(map, CSV_DELIMITER).into_owned();
    }

    fn write(
        &self,
        out: &mut dyn Write,
        entry: &Entry,
        last: impl FnOnce(&Entry) -> String,
    ) -> io::Result<()> {
        let Some(k) = key::decode(&entry.key, &self.filter) else {
            trace!(map = %self.map, key = %entry.key, "filtered out");
            return Ok(());
        };
        writeln!(
            out,
            "{},{},{},{},{}",
            self.map,
            k.path,
            k.revision,
            k.tag,
            last(entry)
        )
    }
}

/// Decoded key followed by the character length of the value.
#[derive(Debug)]
pub struct LengthRenderer(DecodedRows);

impl RenderMap for LengthRenderer {
    fn begin_map(&mut self, _out: &mut dyn Write, map: &str) -> io::Result<()> {
        self.0.begin(map);
        Ok(())
    }

    fn entry(&mut self, out: &mut dyn Write, entry: &Entry) -> io::Result<()> {
        self.0.write(out, entry, |e| char_len(&e.value).to_string())
    }
}

/// Decoded key followed by the value, commas replaced.
#[derive(Debug)]
pub struct ValueRenderer(DecodedRows);

impl RenderMap for ValueRenderer {
    fn begin_map(&mut self, _out: &mut dyn Write, map: &str) -> io::Result<()> {
        self.0.begin(map);
        Ok(())
    }

    fn entry(&mut self, out: &mut dyn Write, entry: &Entry) -> io::Result<()> {
        self.0.write(out, entry, |e| escape(&e.value, CSV_DELIMITER).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: &str) -> Entry {
        Entry {
            key: key.into(),
            value: value.into(),
        }
    }

    fn render(mut renderer: Renderer, map: &str, entries: &[Entry]) -> String {
        let mut out = Vec::new();
        renderer.begin_map(&mut out, map).unwrap();
        for e in entries {
            renderer.entry(&mut out, e).unwrap();
        }
        renderer.end_map(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn decoded(path: &str, revision: &str, values: bool) -> Renderer {
        let config = RunConfig {
            path: path.into(),
            revision: revision.into(),
            values,
            ..Default::default()
        };
        Renderer::new(DumpMode::select(&config), &config)
    }

    #[test]
    fn statistics_totals() {
        let mut r = StatisticsRenderer::default();
        let mut out = Vec::new();
        r.begin_map(&mut out, "m").unwrap();
        r.entry(&mut out, &entry("a", "xyz")).unwrap();
        r.entry(&mut out, &entry("bb", "q")).unwrap();
        assert_eq!(
            r.stats(),
            MapStats {
                entries: 2,
                key_length: 3,
                value_length: 4
            }
        );
        assert!(out.is_empty());
    }

    #[test]
    fn statistics_block() {
        let r = Renderer::new(DumpMode::Statistics, &RunConfig::default());
        let s = render(r, "nodes", &[entry("a", "xyz"), entry("bb", "q")]);
        assert_eq!(s, "map: nodes\nentries: 2\nkeyLength: 3\nvalueLength: 4\n\n");
    }

    #[test]
    fn statistics_count_chars_not_bytes() {
        let mut stats = MapStats::default();
        stats.add(&entry("é", "日本"));
        assert_eq!(stats.key_length, 1);
        assert_eq!(stats.value_length, 2);
    }

    #[test]
    fn supplementary_chars_count_once() {
        let mut stats = MapStats::default();
        stats.add(&entry("🦀", "a😀b"));
        assert_eq!(stats.key_length, 1);
        assert_eq!(stats.value_length, 3);

        let s = render(decoded("/", "", false), "m", &[entry("/🦀", "😀😀")]);
        assert_eq!(s, "m,/🦀,,,2\n");
    }

    #[test]
    fn statistics_reset_between_maps() {
        let mut r = StatisticsRenderer::default();
        let mut out = Vec::new();
        r.begin_map(&mut out, "a").unwrap();
        r.entry(&mut out, &entry("k", "v")).unwrap();
        r.end_map(&mut out).unwrap();
        r.begin_map(&mut out, "b").unwrap();
        assert_eq!(r.stats(), MapStats::default());
    }

    #[test]
    fn raw_escapes_pipes_only() {
        let r = Renderer::new(DumpMode::Raw, &RunConfig::default());
        let s = render(r, "m", &[entry("a|b,c", "x|y,z")]);
        assert_eq!(s, "m|a#b,c|x#y,z\n");
    }

    #[test]
    fn raw_skips_decomposition() {
        let r = Renderer::new(DumpMode::Raw, &RunConfig::default());
        let s = render(r, "nodes", &[entry("1/foo/bar@r7", "hello")]);
        assert_eq!(s, "nodes|1/foo/bar@r7|hello\n");
    }

    #[test]
    fn decoded_with_length() {
        let s = render(
            decoded("/foo", "r", false),
            "nodes",
            &[entry("1/foo/bar@r7", "hello")],
        );
        assert_eq!(s, "nodes,/foo/bar,r7,1,5\n");
    }

    #[test]
    fn decoded_with_value() {
        let s = render(
            decoded("/foo", "r", true),
            "nodes",
            &[entry("1/foo/bar@r7", "hello")],
        );
        assert_eq!(s, "nodes,/foo/bar,r7,1,hello\n");
    }

    #[test]
    fn decoded_filtered_out() {
        let s = render(
            decoded("/zzz", "", false),
            "nodes",
            &[entry("1/foo/bar@r7", "hello")],
        );
        assert_eq!(s, "");
    }

    #[test]
    fn decoded_escapes_commas() {
        let s = render(
            decoded("/", "", true),
            "m,x",
            &[entry("t,1/a,b@r,2", "v,w|z")],
        );
        assert_eq!(s, "m#x,/a#b,r#2,t#1,v#w|z\n");
    }

    #[test]
    fn decoded_length_uses_original_value() {
        let s = render(decoded("/", "", false), "m", &[entry("/a", "a,b")]);
        assert_eq!(s, "m,/a,,,3\n");
    }
}
