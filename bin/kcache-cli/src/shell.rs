//! Line-oriented command shell over a string cache

use anyhow::{Result, bail};
use kcache::KCache;
use std::fmt::Write;

pub type StringCache = KCache<String, String>;

/// One parsed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: String, value: String },
    Get { key: String },
    Delete { key: String },
    Scan { prefix: Option<String> },
    Size,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  put <key> <value>   write a value (the rest of the line is the value)
  get <key>           read a value from the local cache
  delete <key>        write a tombstone for a key
  scan [prefix]       list entries in key order
  size                number of live keys
  help                show this help
  quit                leave the shell";

/// Parse one input line; blank lines and `#` comments yield `None`
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

    let command = match verb.to_ascii_lowercase().as_str() {
        "put" | "set" => {
            let Some((key, value)) = rest.split_once(char::is_whitespace) else {
                bail!("usage: put <key> <value>");
            };
            Command::Put {
                key: key.to_string(),
                value: value.trim_start().to_string(),
            }
        }
        "get" => Command::Get {
            key: single_arg(verb, rest)?,
        },
        "delete" | "del" | "rm" => Command::Delete {
            key: single_arg(verb, rest)?,
        },
        "scan" | "ls" => Command::Scan {
            prefix: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "size" => Command::Size,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}' (try 'help')"),
    };
    Ok(Some(command))
}

fn single_arg(verb: &str, rest: &str) -> Result<String> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        bail!("usage: {verb} <key>");
    }
    Ok(rest.to_string())
}

/// Run a command against the cache and render its output
pub async fn execute(cache: &StringCache, command: Command) -> Result<String> {
    let output = match command {
        Command::Put { key, value } => match cache.put(&key, &value).await? {
            Some(previous) => format!("OK (was {previous:?})"),
            None => "OK".to_string(),
        },
        Command::Get { key } => match cache.get(&key) {
            Some(value) => value,
            None => "(not found)".to_string(),
        },
        Command::Delete { key } => match cache.delete(&key).await? {
            Some(previous) => format!("OK (was {previous:?})"),
            None => "OK (not present)".to_string(),
        },
        Command::Scan { prefix } => {
            let entries = cache.scan(|k, _| prefix.as_deref().is_none_or(|p| k.starts_with(p)));
            let mut out = String::new();
            for (key, value) in &entries {
                writeln!(out, "{key} = {value}")?;
            }
            write!(out, "({} entries)", entries.len())?;
            out
        }
        Command::Size => cache.size().to_string(),
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    };
    Ok(output)
}
