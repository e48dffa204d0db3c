//! # cache-dump
//!
//! Read-only inspection of key-value cache files. A dump walks the named maps
//! of a [`store::Store`] and writes, depending on the [`mode::DumpMode`]
//! selected by the [`config::RunConfig`]:
//!
//! - a statistics block per map (entry count, summed key and value lengths),
//! - raw `map|key|value` lines,
//! - or CSV rows `map,path,revision,p2,length|value` where each key is split
//!   into a tag (`p2`), a path and a revision by [`key::decode`].
//!
//! Delimiter characters found in keys and values are replaced with `#` so they
//! cannot break the columns of the chosen format.
use std::io::{self, Write};

pub mod config;
pub mod error;
pub mod key;
pub mod mode;
pub mod render;
pub mod run;
pub mod store;

pub use config::{plan, RunConfig, Step};
pub use error::{DumpError, DumpResult};
pub use mode::DumpMode;
pub use run::{DumpSummary, Runner};
pub use store::{Store, StoreError, StoreWriter};

pub const USAGE: &str = "\
Usage: cache-dump [path=<prefix>] [revision=<prefix>] [map=<name>] [+values|-values] [+dumpMap|-dumpMap] [out=<file>] <storeFile> ...
Options apply to the store files listed after them.
Files are opened read-only; copy the cache file of a running system before analyzing it.
Output format is CSV (',' in keys and values replaced with '#').
To import into H2: create table cache as select * from csvread('cache.csv', null, 'fieldDelimiter=')
";

pub fn write_usage(out: &mut dyn Write) -> io::Result<()> {
    out.write_all(USAGE.as_bytes())?;
    out.flush()
}
