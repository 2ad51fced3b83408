// SPDX-License-Identifier: Apache-2.0

//! Position-tracked line tailing.
//!
//! A [`Tailer`] follows appends to one file and yields complete lines, each
//! paired with the seek position immediately after it. Rotation shows up to
//! the tailer as either a truncation of the same inode (the rotation
//! manager's truncate-in-place) or a replacement of the path by a new inode;
//! both cause a transparent reopen from the start of the file, never an
//! error. Callers drive `read_lines` from a poll loop.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::forwarder::seek::SeekPosition;

/// One decoded line plus the position to resume from after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    pub text: String,
    pub position: SeekPosition,
}

pub struct Tailer {
    path: PathBuf,
    reader: BufReader<File>,
    /// Identity of the currently open file
    dev: u64,
    ino: u64,
    /// Offset just past the last complete line
    committed: u64,
    /// Bytes consumed past `committed` that belong to an incomplete line
    pending_bytes: u64,
    /// Text of the incomplete line
    partial: String,
}

impl Tailer {
    /// Open `path` for tailing, resuming at `start` if given. The caller is
    /// expected to have bounds-checked a persisted position first.
    pub fn open(path: impl AsRef<Path>, start: Option<SeekPosition>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let (dev, ino) = identity(&file)?;

        let committed = start.map(|p| p.offset).unwrap_or(0);
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(committed))?;

        Ok(Self {
            path,
            reader,
            dev,
            ino,
            committed,
            pending_bytes: 0,
            partial: String::new(),
        })
    }

    /// The position a restarted tailer should resume from.
    pub fn position(&self) -> SeekPosition {
        SeekPosition::new(self.dev, self.ino, self.committed)
    }

    /// Read all complete lines appended since the last poll.
    ///
    /// Detects truncation (file shrank behind the read position) and
    /// replacement (path now names a different inode) and restarts from the
    /// beginning of the file in either case. A missing path is not an
    /// error; the current handle keeps draining and the next poll after
    /// recreation picks up the new file.
    pub fn read_lines(&mut self) -> io::Result<Vec<LineEvent>> {
        self.check_rotation()?;

        let mut events = Vec::new();
        loop {
            let mut chunk = String::new();
            let n = self.reader.read_line(&mut chunk)?;
            if n == 0 {
                break; // EOF for now
            }
            self.pending_bytes += n as u64;
            self.partial.push_str(&chunk);

            if self.partial.ends_with('\n') {
                let text = self.partial.trim_end_matches(['\n', '\r']).to_string();
                self.committed += self.pending_bytes;
                self.pending_bytes = 0;
                self.partial.clear();
                events.push(LineEvent {
                    text,
                    position: SeekPosition::new(self.dev, self.ino, self.committed),
                });
            }
            // No newline yet: keep buffering until the writer finishes the line.
        }

        Ok(events)
    }

    fn check_rotation(&mut self) -> io::Result<()> {
        // Truncated in place: the open handle's file shrank below our
        // position, so everything we knew about it is gone.
        let len = self.reader.get_ref().metadata()?.len();
        if len < self.committed + self.pending_bytes {
            debug!(path = ?self.path, "file truncated, restarting from the beginning");
            return self.restart_current();
        }

        // Replaced: the path now points at a different file than the one we
        // hold open. Finish only if the old handle is drained; otherwise the
        // remaining lines of the old file would be lost.
        match std::fs::metadata(&self.path) {
            Ok(meta) => {
                let (dev, ino) = identity_of(&meta);
                if (dev, ino) != (self.dev, self.ino) && len == self.committed + self.pending_bytes
                {
                    debug!(path = ?self.path, "file replaced, reopening");
                    return self.reopen();
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        Ok(())
    }

    fn restart_current(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.committed = 0;
        self.pending_bytes = 0;
        self.partial.clear();
        Ok(())
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = File::open(&self.path)?;
        let (dev, ino) = identity(&file)?;
        self.reader = BufReader::new(file);
        self.dev = dev;
        self.ino = ino;
        self.committed = 0;
        self.pending_bytes = 0;
        self.partial.clear();
        Ok(())
    }
}

#[cfg(unix)]
fn identity(file: &File) -> io::Result<(u64, u64)> {
    Ok(identity_of(&file.metadata()?))
}

#[cfg(unix)]
fn identity_of(meta: &std::fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, data: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(data.as_bytes()).unwrap();
    }

    #[test]
    fn reads_appended_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.log");
        fs::write(&path, "one\ntwo\n").unwrap();

        let mut tailer = Tailer::open(&path, None).unwrap();
        let events = tailer.read_lines().unwrap();
        assert_eq!(
            events.iter().map(|e| e.text.as_str()).collect::<Vec<_>>(),
            vec!["one", "two"]
        );

        assert!(tailer.read_lines().unwrap().is_empty());

        append(&path, "three\n");
        let events = tailer.read_lines().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "three");
    }

    #[test]
    fn positions_point_past_each_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.log");
        fs::write(&path, "ab\ncdef\n").unwrap();

        let mut tailer = Tailer::open(&path, None).unwrap();
        let events = tailer.read_lines().unwrap();
        assert_eq!(events[0].position.offset, 3);
        assert_eq!(events[1].position.offset, 8);
        assert_eq!(tailer.position().offset, 8);
    }

    #[test]
    fn resumes_from_given_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.log");
        fs::write(&path, "old line\nnew line\n").unwrap();

        let mut tailer = Tailer::open(&path, None).unwrap();
        let first = &tailer.read_lines().unwrap()[0];
        let resume = first.position;

        let mut tailer = Tailer::open(&path, Some(resume)).unwrap();
        let events = tailer.read_lines().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "new line");
    }

    #[test]
    fn incomplete_line_is_buffered_until_complete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.log");
        fs::write(&path, "").unwrap();

        let mut tailer = Tailer::open(&path, None).unwrap();
        append(&path, "telegram=|_ab");
        assert!(tailer.read_lines().unwrap().is_empty());
        // Position must not advance past an unfinished line
        assert_eq!(tailer.position().offset, 0);

        append(&path, "cd|\n");
        let events = tailer.read_lines().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "telegram=|_abcd|");
    }

    #[test]
    fn truncation_restarts_from_beginning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.log");
        fs::write(&path, "a long first line\n").unwrap();

        let mut tailer = Tailer::open(&path, None).unwrap();
        assert_eq!(tailer.read_lines().unwrap().len(), 1);

        // Truncate in place and write fresh content (rotation manager style)
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(0)
            .unwrap();
        append(&path, "fresh\n");

        let events = tailer.read_lines().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "fresh");
        assert_eq!(events[0].position.offset, 6);
    }

    #[test]
    fn replacement_reopens_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.log");
        fs::write(&path, "before\n").unwrap();

        let mut tailer = Tailer::open(&path, None).unwrap();
        assert_eq!(tailer.read_lines().unwrap().len(), 1);

        fs::remove_file(&path).unwrap();
        // Missing path is not an error
        assert!(tailer.read_lines().unwrap().is_empty());

        fs::write(&path, "after\n").unwrap();
        let events = tailer.read_lines().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "after");
    }

    #[test]
    fn crlf_is_stripped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.log");
        fs::write(&path, "line\r\n").unwrap();

        let mut tailer = Tailer::open(&path, None).unwrap();
        let events = tailer.read_lines().unwrap();
        assert_eq!(events[0].text, "line");
        assert_eq!(events[0].position.offset, 6);
    }
}
