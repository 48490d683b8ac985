//! Append-only JSONL journal of committed transactions.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<E> {
    pub index: u64,
    pub ms: u64,
    pub entry: E,
}

#[derive(Debug)]
pub struct Journal<E> {
    path: PathBuf,
    next_index: u64,
    _phantom: std::marker::PhantomData<E>,
}

impl<E> Journal<E>
where
    E: Serialize + for<'de> Deserialize<'de>,
{
    /// Open (or create lazily on first append) and return every entry already
    /// on disk, oldest first.
    pub fn open(path: PathBuf) -> anyhow::Result<(Self, Vec<Envelope<E>>)> {
        let mut out = Self {
            path,
            next_index: 1,
            _phantom: std::marker::PhantomData,
        };
        let replay = out.load_replay()?;
        Ok((out, replay))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// The index is only consumed once the line is on disk.
    pub fn append(&mut self, ms: u64, entry: &E) -> anyhow::Result<u64> {
        #[derive(Serialize)]
        struct EnvelopeRef<'a, E> {
            index: u64,
            ms: u64,
            entry: &'a E,
        }

        let index = self.next_index;
        let line = serde_json::to_string(&EnvelopeRef { index, ms, entry })?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create journal dir {}", dir.display()))?;
            }
        }

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open journal {}", self.path.display()))?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;
        f.flush()?;

        self.next_index = index.saturating_add(1);
        Ok(index)
    }

    fn load_replay(&mut self) -> anyhow::Result<Vec<Envelope<E>>> {
        let f = match std::fs::File::open(&self.path) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let rd = BufReader::new(f);

        let mut out = Vec::new();
        let mut max_index = 0u64;
        for (lineno, line) in rd.lines().enumerate() {
            let line = line?;
            let raw = line.trim();
            if raw.is_empty() {
                continue;
            }
            let env: Envelope<E> = serde_json::from_str(raw).map_err(|e| {
                anyhow::anyhow!(
                    "journal parse error at {}:{}: {}",
                    self.path.display(),
                    lineno + 1,
                    e
                )
            })?;
            max_index = max_index.max(env.index);
            out.push(env);
        }
        self.next_index = max_index.saturating_add(1).max(1);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("journal.jsonl");

        let (mut j, replay) = Journal::<Vec<u32>>::open(path.clone()).unwrap();
        assert!(replay.is_empty());
        assert_eq!(j.append(10, &vec![1, 2]).unwrap(), 1);
        assert_eq!(j.append(11, &vec![3]).unwrap(), 2);

        let (j2, replay) = Journal::<Vec<u32>>::open(path).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].entry, vec![1, 2]);
        assert_eq!(replay[1].ms, 11);
        assert_eq!(j2.next_index(), 3);
    }

    #[test]
    fn corrupt_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        std::fs::write(&path, "{\"index\":1,\"ms\":0,\"entry\":[1]}\nnot json\n").unwrap();
        let err = Journal::<Vec<u32>>::open(path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }
}
