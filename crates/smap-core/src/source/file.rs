use std::path::PathBuf;

use futures::stream::{self, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{EntrySource, EntryStream};
use crate::types::RawEntry;
use crate::{Error, Result};

/// Reads a URL list, one entry per line:
///
/// ```text
/// # url<TAB>lastmod<TAB>changefreq<TAB>priority
/// https://example.com/
/// https://example.com/about	2024-01-15	monthly	0.8
/// https://example.com/blog		daily
/// ```
///
/// Trailing fields are optional and empty fields mean "absent". Blank lines
/// and lines starting with `#` are skipped. The file is read line by line.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    label: String,
}

impl FileSource {
    /// Create a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }
}

enum ReadState {
    Start(PathBuf),
    Reading {
        lines: Lines<BufReader<File>>,
        line_no: usize,
    },
    Done,
}

impl EntrySource for FileSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn into_stream(self: Box<Self>, _cancel: CancellationToken) -> EntryStream {
        stream::unfold(ReadState::Start(self.path), |state| async move {
            let (mut lines, mut line_no) = match state {
                ReadState::Start(path) => match File::open(&path).await {
                    Ok(file) => {
                        debug!(path = %path.display(), "reading URL list");
                        (BufReader::new(file).lines(), 0)
                    },
                    Err(e) => return Some((Err(Error::Io(e)), ReadState::Done)),
                },
                ReadState::Reading { lines, line_no } => (lines, line_no),
                ReadState::Done => return None,
            };

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        line_no += 1;
                        match parse_line(&line, line_no) {
                            Ok(Some(entry)) => {
                                return Some((Ok(entry), ReadState::Reading { lines, line_no }));
                            },
                            Ok(None) => {},
                            Err(e) => return Some((Err(e), ReadState::Done)),
                        }
                    },
                    Ok(None) => return None,
                    Err(e) => return Some((Err(Error::Io(e)), ReadState::Done)),
                }
            }
        })
        .boxed()
    }
}

/// Parse one line of a URL list. `Ok(None)` for blank and comment lines.
///
/// A priority that is not a number is kept as NaN so the validator reports
/// it against the entry instead of failing the whole file.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<RawEntry>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.trim_start().starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() > 4 {
        return Err(Error::Parse(format!(
            "line {line_no}: expected at most 4 tab-separated fields, found {}",
            fields.len()
        )));
    }
    let field = |i: usize| fields.get(i).copied().filter(|f| !f.is_empty());

    let Some(url) = field(0) else {
        return Err(Error::Parse(format!("line {line_no}: missing URL")));
    };

    let mut entry = RawEntry::new(url);
    if let Some(lastmod) = field(1) {
        entry = entry.with_last_modified_text(lastmod);
    }
    if let Some(frequency) = field(2) {
        entry = entry.with_change_frequency_text(frequency);
    }
    if let Some(priority) = field(3) {
        entry = entry.with_priority(priority.parse().unwrap_or(f64::NAN));
    }
    Ok(Some(entry))
}
