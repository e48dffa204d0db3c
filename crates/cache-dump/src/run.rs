use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::config::{RunConfig, Step};
use crate::error::{DumpError, DumpResult};
use crate::mode::DumpMode;
use crate::render::{RenderMap, Renderer};
use crate::store::{Store, StoreError};

/// What one dumped file produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub maps: usize,
    pub entries: usize,
}

/// Drives store files through a renderer into an output sink.
pub struct Runner<W> {
    target: Box<str>,
    out: W,
}

impl<W: Write> Runner<W> {
    pub fn new(target: impl Into<Box<str>>, out: W) -> Self {
        Self {
            target: target.into(),
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn output_error(&self, source: io::Error) -> DumpError {
        DumpError::OutputWrite {
            target: self.target.clone(),
            source,
        }
    }

    pub fn flush(&mut self) -> DumpResult<()> {
        self.out.flush().map_err(|e| self.output_error(e))
    }

    /// Dump every map of `file` that `config` selects. Nothing is written when
    /// the store cannot be opened.
    pub fn dump(&mut self, file: &Path, config: &RunConfig) -> DumpResult<DumpSummary> {
        let store_error = |source: StoreError| DumpError::StoreOpen {
            file: file.to_path_buf(),
            source,
        };
        let store = Store::open(file).map_err(store_error)?;
        let names = store.map_names().map_err(store_error)?;

        let mode = DumpMode::select(config);
        debug!(file = %file.display(), ?mode, "dumping");
        let mut renderer = Renderer::new(mode, config);
        if let Some(header) = mode.header() {
            writeln!(self.out, "{header}").map_err(|e| self.output_error(e))?;
        }

        let mut summary = DumpSummary::default();
        for name in names {
            if !config.accepts_map(&name) {
                debug!(map = %name, "skipped by map filter");
                continue;
            }

            let map_error = |source: StoreError| DumpError::MapOpen {
                file: file.to_path_buf(),
                map: name.as_str().into(),
                source,
            };
            let map = store.open_map(&name).map_err(map_error)?;
            renderer
                .begin_map(&mut self.out, &name.to_lowercase())
                .map_err(|e| self.output_error(e))?;
            let mut entries = 0;
            for entry in map.entries() {
                let entry = entry.map_err(map_error)?;
                renderer
                    .entry(&mut self.out, &entry)
                    .map_err(|e| self.output_error(e))?;
                entries += 1;
            }
            renderer
                .end_map(&mut self.out)
                .map_err(|e| self.output_error(e))?;
            debug!(map = map.name(), id = map.id(), entries, "dumped map");
            summary.maps += 1;
            summary.entries += entries;
        }

        info!(
            file = %store.path().display(),
            maps = summary.maps,
            entries = summary.entries,
            "dumped store"
        );
        store.close();
        Ok(summary)
    }
}

impl<'a> Runner<Box<dyn Write + 'a>> {
    pub fn stdout() -> Self {
        Self::new("stdout", Box::new(BufWriter::new(io::stdout())))
    }

    /// Flush the current sink and send all further output to `path`.
    pub fn redirect(&mut self, path: &Path) -> DumpResult<()> {
        self.flush()?;
        let target: Box<str> = path.display().to_string().into();
        let file = File::create(path).map_err(|source| DumpError::OutputWrite {
            target: target.clone(),
            source,
        })?;
        debug!(%target, "redirected output");
        self.out = Box::new(BufWriter::new(file));
        self.target = target;
        Ok(())
    }

    /// Execute the steps in order, stopping at the first error. Output already
    /// written for earlier files stays on its sink.
    pub fn run(&mut self, steps: impl IntoIterator<Item = Step>) -> DumpResult<()> {
        let result = steps.into_iter().try_for_each(|step| match step {
            Step::Redirect(path) => self.redirect(&path),
            Step::Dump { file, config } => self.dump(&file, &config).map(|_| ()),
        });
        let flushed = self.flush();
        result.and(flushed)
    }
}
