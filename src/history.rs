use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default number of entries kept in memory and on disk.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// File name used under `$HOME` when no history path is configured.
pub const DEFAULT_FILE_NAME: &str = ".shell_pipeline_history";

/// Ordered list of previously entered lines, optionally backed by a file.
///
/// The file holds one entry per line and is rewritten in full on every change.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<String>,
    max_entries: usize,
    path: Option<PathBuf>,
    clears: u64,
}

impl History {
    /// History that lives only for the duration of the process.
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            max_entries: DEFAULT_MAX_ENTRIES,
            path: None,
            clears: 0,
        }
    }

    /// Open the history file at `path`, creating it when missing, and load its entries.
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("history: can't create {}", parent.display()))?;
            }
            fs::File::create(&path)
                .with_context(|| format!("history: can't create {}", path.display()))?;
        }

        let mut history = Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
            path: Some(path),
            clears: 0,
        };
        history.load()?;
        Ok(history)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a line, dropping the oldest entries beyond the size limit, and persist.
    pub fn add(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        self.entries.push(line.to_string());
        self.truncate();
        self.save()
    }

    /// Forget every entry and persist the empty history.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.clears += 1;
        self.save()
    }

    /// How many times the history was cleared; line editors compare it to
    /// know when their own recall buffer has to be dropped too.
    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    /// Write all entries to the backing file, if there is one.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = fs::File::create(path)
            .with_context(|| format!("history: can't write {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            writeln!(writer, "{}", entry)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let file = fs::File::open(&path)
            .with_context(|| format!("history: can't read {}", path.display()))?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                self.entries.push(line);
            }
        }
        self.truncate();
        log::debug!(
            "loaded {} history entries from {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::in_memory()
    }
}
