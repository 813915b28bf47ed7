//! The `ls` builtin: directory listings in a compact multi-column layout or a
//! long, one entry per line format.
//!
//! Unlike the argh-described builtins, `ls` accepts bundled short flags
//! (`-la`), so it parses its own arguments.

use crate::command::Builtin;
use crate::env::Environment;
use crate::parser::ParseError;
use crate::theme::{Theme, visible_width};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

const DEFAULT_WIDTH: usize = 80;

const HELP: &str = "\
Usage: ls [-l] [-a] [-h] [path...]

List directory contents.

Options:
  -l                use long listing format
  -a                show hidden files
  -h                human-readable sizes";

/// `ls [-lah] [path...]`
pub struct Ls;

#[derive(Debug, Default, PartialEq, Eq)]
struct LsOptions {
    long: bool,
    all: bool,
    human: bool,
}

fn parse_options(args: &[String]) -> Result<(Vec<String>, LsOptions), ParseError> {
    let mut opts = LsOptions::default();
    let mut paths = Vec::new();

    for arg in args {
        match arg.strip_prefix('-') {
            Some(flags) if !flags.is_empty() => {
                for flag in flags.chars() {
                    match flag {
                        'l' => opts.long = true,
                        'a' => opts.all = true,
                        'h' => opts.human = true,
                        other => {
                            return Err(ParseError::UnknownOption(format!("ls: -{}", other)));
                        }
                    }
                }
            }
            _ => paths.push(arg.clone()),
        }
    }

    Ok((paths, opts))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    kind: EntryKind,
    size: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    modified: Option<SystemTime>,
    link_target: Option<String>,
}

impl Entry {
    fn from_metadata(name: String, path: &Path, meta: &Metadata) -> Self {
        let kind = if meta.file_type().is_symlink() {
            EntryKind::Symlink
        } else if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let (mode, uid, gid) = ownership(meta);
        let link_target = match kind {
            EntryKind::Symlink => fs::read_link(path)
                .ok()
                .map(|target| target.to_string_lossy().to_string()),
            _ => None,
        };
        Self {
            name,
            kind,
            size: meta.len(),
            mode,
            uid,
            gid,
            modified: meta.modified().ok(),
            link_target,
        }
    }

    fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    fn is_executable(&self) -> bool {
        self.kind == EntryKind::File && self.mode & 0o111 != 0
    }

    fn colored_name(&self, theme: &Theme) -> String {
        match self.kind {
            EntryKind::Directory => theme.directory(&self.name),
            EntryKind::Symlink => theme.symlink(&self.name),
            EntryKind::File if self.is_executable() => theme.executable(&self.name),
            EntryKind::File => self.name.clone(),
        }
    }

    fn permissions(&self) -> String {
        let kind = match self.kind {
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::File => '-',
        };
        let mut out = String::with_capacity(10);
        out.push(kind);
        for shift in [6, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

#[cfg(unix)]
fn ownership(meta: &Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode(), meta.uid(), meta.gid())
}

#[cfg(not(unix))]
fn ownership(meta: &Metadata) -> (u32, u32, u32) {
    let mode = if meta.is_dir() { 0o755 } else { 0o644 };
    (mode, 0, 0)
}

/// User and group names keyed by numeric id, read from the system account files.
#[derive(Debug, Default)]
struct Accounts {
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

impl Accounts {
    fn load() -> Self {
        let read = |path: &str| {
            fs::read_to_string(path)
                .map(|content| parse_id_file(&content))
                .unwrap_or_default()
        };
        Self {
            users: read("/etc/passwd"),
            groups: read("/etc/group"),
        }
    }

    fn user(&self, uid: u32) -> String {
        self.users
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }

    fn group(&self, gid: u32) -> String {
        self.groups
            .get(&gid)
            .cloned()
            .unwrap_or_else(|| gid.to_string())
    }
}

/// Parse `name:password:id:...` lines as found in /etc/passwd and /etc/group.
fn parse_id_file(content: &str) -> HashMap<u32, String> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let id = fields.nth(1)?.parse().ok()?;
            Some((id, name.to_string()))
        })
        .collect()
}

/// Entries of the directory at `path`, or just `path` itself when it is not a
/// directory, in which case it is listed under `shown_as`.
fn read_entries(path: &Path, shown_as: &str) -> Result<Vec<Entry>> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("ls: cannot access {}", path.display()))?;

    if !fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(vec![Entry::from_metadata(shown_as.to_string(), path, &meta)]);
    }

    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(path)
        .with_context(|| format!("ls: cannot open directory {}", path.display()))?
    {
        let dir_entry = dir_entry?;
        let entry_path = dir_entry.path();
        let Ok(meta) = fs::symlink_metadata(&entry_path) else {
            continue;
        };
        let name = dir_entry.file_name().to_string_lossy().to_string();
        entries.push(Entry::from_metadata(name, &entry_path, &meta));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Sizes in powers of 1024 with one decimal, e.g. `1.5K`.
fn human_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    if size < UNIT {
        return size.to_string();
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1}{}", size as f64 / div as f64, suffix)
}

fn format_time(time: Option<SystemTime>) -> String {
    match time {
        Some(time) => DateTime::<Local>::from(time).format("%b %e %H:%M").to_string(),
        None => "?".to_string(),
    }
}

fn format_long(
    entries: &[Entry],
    human: bool,
    theme: &Theme,
    accounts: &Accounts,
    out: &mut dyn Write,
) -> Result<()> {
    let rows: Vec<[String; 6]> = entries
        .iter()
        .map(|entry| {
            let size = if human {
                human_size(entry.size)
            } else {
                entry.size.to_string()
            };
            let mut name = entry.colored_name(theme);
            if let Some(target) = &entry.link_target {
                name = format!("{} -> {}", name, target);
            }
            [
                entry.permissions(),
                accounts.user(entry.uid),
                accounts.group(entry.gid),
                size,
                format_time(entry.modified),
                name,
            ]
        })
        .collect();

    let width = |col: usize| rows.iter().map(|r| r[col].len()).max().unwrap_or(0);
    let (owner_w, group_w, size_w) = (width(1), width(2), width(3));

    for [perms, owner, group, size, modified, name] in &rows {
        writeln!(
            out,
            "{}  {:<owner_w$}  {:<group_w$}  {:>size_w$}  {}  {}",
            perms, owner, group, size, modified, name
        )?;
    }
    Ok(())
}

/// Column-major layout that fits `width` terminal cells.
fn format_compact(entries: &[Entry], width: usize, theme: &Theme, out: &mut dyn Write) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let names: Vec<String> = entries.iter().map(|e| e.colored_name(theme)).collect();
    let max_len = names.iter().map(|n| visible_width(n)).max().unwrap_or(0);
    let col_width = max_len + 2;
    let cols = (width / col_width).max(1);
    let rows = entries.len().div_ceil(cols);

    for row in 0..rows {
        let mut line = String::new();
        for col in 0..cols {
            let idx = col * rows + row;
            let Some(name) = names.get(idx) else {
                break;
            };
            line.push_str(name);
            let is_last = col + 1 == cols || idx + rows >= names.len();
            if !is_last {
                line.push_str(&" ".repeat(col_width - visible_width(name)));
            }
        }
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

fn terminal_width(env: &Environment) -> usize {
    env.get_var("COLUMNS")
        .and_then(|c| c.trim().parse().ok())
        .filter(|w| *w > 0)
        .unwrap_or(DEFAULT_WIDTH)
}

impl Builtin for Ls {
    fn execute(&self, args: &[String], stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        if args.iter().any(|a| a == "--help") {
            writeln!(stdout, "{}", HELP)?;
            return Ok(());
        }

        let (mut paths, opts) = parse_options(args)?;
        if paths.is_empty() {
            paths.push(".".to_string());
        }

        let theme = Theme::new(env.use_color());
        let accounts = if opts.long {
            Accounts::load()
        } else {
            Accounts::default()
        };

        for (i, path) in paths.iter().enumerate() {
            if i > 0 {
                writeln!(stdout, "\n{}:", path)?;
            }

            let mut entries = read_entries(&env.current_dir.join(path), path)?;
            if !opts.all {
                entries.retain(|e| !e.is_hidden());
            }

            if opts.long {
                format_long(&entries, opts.human, &theme, &accounts, stdout)?;
            } else {
                format_compact(&entries, terminal_width(env), &theme, stdout)?;
            }
        }
        Ok(())
    }

    fn help(&self) -> String {
        HELP.to_string()
    }
}
