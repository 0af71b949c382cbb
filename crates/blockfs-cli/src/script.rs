//! Line-oriented command language shared by `shell` and `run`.

use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use blockfs_config::log_cli_debug;
use blockfs_core::{Engine, Fd};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open { name: String, create: bool },
    Write { fd: Fd, data: Vec<u8> },
    Read { fd: Fd, len: usize },
    Close { fd: Fd },
    Delete { name: String },
    Layout { name: String },
    List,
    Stat,
    Errno,
    Destroy,
    Quit,
}

fn parse_fd(word: Option<&str>) -> Result<Fd> {
    let raw = word.ok_or_else(|| anyhow!("missing descriptor"))?;
    let n: usize = raw
        .parse()
        .with_context(|| format!("bad descriptor: {raw}"))?;
    Ok(Fd(n))
}

fn parse_name(word: Option<&str>) -> Result<String> {
    word.map(str::to_string)
        .ok_or_else(|| anyhow!("missing file name"))
}

/// Expand `\n`, `\t` and `\\` in write payloads.
fn unescape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('\\') => out.push(b'\\'),
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim_start();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let mut words = rest.split_whitespace();

        let command = match verb {
            "open" => {
                let name = parse_name(words.next())?;
                let create = match words.next() {
                    None => false,
                    Some("create") => true,
                    Some(other) => bail!("unknown open flag: {other}"),
                };
                Command::Open { name, create }
            }
            "write" => {
                let rest = rest.trim_start();
                let (fd, payload) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Command::Write {
                    fd: parse_fd(Some(fd).filter(|s| !s.is_empty()))?,
                    data: unescape(payload),
                }
            }
            "read" => {
                let fd = parse_fd(words.next())?;
                let len = words
                    .next()
                    .ok_or_else(|| anyhow!("missing length"))?
                    .parse()
                    .context("bad length")?;
                Command::Read { fd, len }
            }
            "close" => Command::Close {
                fd: parse_fd(words.next())?,
            },
            "delete" | "rm" => Command::Delete {
                name: parse_name(words.next())?,
            },
            "layout" => Command::Layout {
                name: parse_name(words.next())?,
            },
            "ls" => Command::List,
            "stat" => Command::Stat,
            "errno" => Command::Errno,
            "destroy" => Command::Destroy,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command: {other}"),
        };
        Ok(command)
    }
}

/// An engine plus the sink its results are printed to.
pub struct Session<W: Write> {
    engine: Engine,
    out: W,
}

impl<W: Write> Session<W> {
    pub fn new(engine: Engine, out: W) -> Self {
        Self { engine, out }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Run one command. Engine failures are printed, not returned.
    ///
    /// Returns `false` once the session should end.
    pub fn execute(&mut self, command: Command) -> Result<bool> {
        let rendered = format!("{command:?}");
        log_cli_debug!("Executing command", command = rendered.as_str());
        let engine = &mut self.engine;
        let out = &mut self.out;

        match command {
            Command::Open { name, create } => match engine.open(&name, create) {
                Ok(fd) => writeln!(out, "fd {fd}")?,
                Err(e) => writeln!(out, "error: {e}")?,
            },
            Command::Write { fd, data } => match engine.write(fd, &data) {
                Ok(n) => writeln!(out, "wrote {n}")?,
                Err(e) => writeln!(out, "error: {e}")?,
            },
            Command::Read { fd, len } => match engine.read(fd, len) {
                Ok(bytes) => writeln!(out, "{}", String::from_utf8_lossy(&bytes))?,
                Err(e) => writeln!(out, "error: {e}")?,
            },
            Command::Close { fd } => match engine.close(fd) {
                Ok(()) => writeln!(out, "ok")?,
                Err(e) => writeln!(out, "error: {e}")?,
            },
            Command::Delete { name } => match engine.delete(&name) {
                Ok(()) => writeln!(out, "ok")?,
                Err(e) => writeln!(out, "error: {e}")?,
            },
            Command::Layout { name } => match engine.block_layout(&name) {
                Some(layout) => {
                    let cells: Vec<String> = layout.iter().map(usize::to_string).collect();
                    writeln!(out, "[{}]", cells.join(", "))?
                }
                None => writeln!(out, "error: No such file: {name}")?,
            },
            Command::List => {
                for name in engine.file_names() {
                    writeln!(out, "{name}")?;
                }
            }
            Command::Stat => {
                writeln!(out, "{}", serde_json::to_string(&engine.stats())?)?;
            }
            Command::Errno => writeln!(out, "{}", engine.last_error())?,
            Command::Destroy => {
                engine.destroy_all();
                writeln!(out, "ok")?;
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Parse and run one line. Blank lines and `#` comments are skipped.
    pub fn run_line(&mut self, line: &str) -> Result<bool> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(true);
        }
        let command: Command = line.trim_end_matches(['\r', '\n']).parse()?;
        self.execute(command)
    }

    /// Run a whole script, stopping at the first malformed line.
    pub fn run_script<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let keep_going = self
                .run_line(&line)
                .with_context(|| format!("line {}: {}", number + 1, line.trim()))?;
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    /// Interactive loop: malformed lines are reported and skipped.
    pub fn run_interactive<R: BufRead>(&mut self, reader: R, prompt: bool) -> Result<()> {
        if prompt {
            write!(self.out, "> ")?;
            self.out.flush()?;
        }
        for line in reader.lines() {
            let line = line?;
            match self.run_line(&line) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => writeln!(self.out, "error: {e:#}")?,
            }
            if prompt {
                write!(self.out, "> ")?;
                self.out.flush()?;
            }
        }
        Ok(())
    }
}
