//! Command line tokens and the configuration they build up.
//!
//! Settings and store files may be interleaved. Tokens are folded left to
//! right over an immutable [`RunConfig`]; every file token captures the
//! configuration in effect at that point.
use std::path::PathBuf;

use crate::key::KeyFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Path prefix filter. Empty means no restriction.
    pub path: String,
    /// Revision prefix filter. Empty means no restriction.
    pub revision: String,
    /// Only dump the map with this name, compared case-insensitively.
    pub map: String,
    pub values: bool,
    pub dump_map: bool,
}

impl RunConfig {
    pub fn with(self, setting: Setting) -> Self {
        match setting {
            Setting::Path(path) => Self { path, ..self },
            Setting::Revision(revision) => Self { revision, ..self },
            Setting::Map(map) => Self { map, ..self },
            Setting::Values(values) => Self { values, ..self },
            Setting::DumpMap(dump_map) => Self { dump_map, ..self },
        }
    }

    pub fn key_filter(&self) -> KeyFilter {
        KeyFilter::new(self.path.clone(), self.revision.clone())
    }

    pub fn accepts_map(&self, name: &str) -> bool {
        self.map.is_empty() || self.map.to_lowercase() == name.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    Path(String),
    Revision(String),
    Map(String),
    Values(bool),
    DumpMap(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Set(Setting),
    Out(PathBuf),
    File(PathBuf),
}

impl Token {
    /// Classify one argument by its prefix. Anything unrecognised is a store
    /// file.
    pub fn parse(arg: &str) -> Self {
        if let Some(v) = arg.strip_prefix("path=") {
            Token::Set(Setting::Path(v.to_owned()))
        } else if let Some(v) = arg.strip_prefix("revision=") {
            Token::Set(Setting::Revision(v.to_owned()))
        } else if let Some(v) = arg.strip_prefix("map=") {
            Token::Set(Setting::Map(v.to_owned()))
        } else if let Some(v) = arg.strip_prefix("out=") {
            Token::Out(PathBuf::from(v))
        } else if arg.starts_with("+values") {
            Token::Set(Setting::Values(true))
        } else if arg.starts_with("-values") {
            Token::Set(Setting::Values(false))
        } else if arg.starts_with("+dumpMap") {
            Token::Set(Setting::DumpMap(true))
        } else if arg.starts_with("-dumpMap") {
            Token::Set(Setting::DumpMap(false))
        } else {
            Token::File(PathBuf::from(arg))
        }
    }
}

/// One unit of work for the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send all following output to this file, truncating it.
    Redirect(PathBuf),
    Dump { file: PathBuf, config: RunConfig },
}

pub fn plan<I>(args: I) -> Vec<Step>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let (_, steps) = args.into_iter().fold(
        (RunConfig::default(), Vec::new()),
        |(config, mut steps), arg| match Token::parse(arg.as_ref()) {
            Token::Set(setting) => (config.with(setting), steps),
            Token::Out(path) => {
                steps.push(Step::Redirect(path));
                (config, steps)
            }
            Token::File(file) => {
                steps.push(Step::Dump {
                    file,
                    config: config.clone(),
                });
                (config, steps)
            }
        },
    );
    steps
}
