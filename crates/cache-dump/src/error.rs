use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

pub type DumpResult<T> = Result<T, DumpError>;

#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Cannot open store {}: {source}", file.display())]
    StoreOpen {
        file: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("Cannot read map ({map}) of store {}: {source}", file.display())]
    MapOpen {
        file: PathBuf,
        map: Box<str>,
        #[source]
        source: StoreError,
    },
    #[error("Cannot write output to {target}: {source}")]
    OutputWrite {
        target: Box<str>,
        #[source]
        source: std::io::Error,
    },
}
