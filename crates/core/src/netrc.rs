//! Minimal `.netrc` reader
//!
//! Only the `machine`, `default`, `login` and `password` tokens are
//! understood; `macdef` bodies and `account` values are skipped.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Login/password pair for a machine
#[derive(Clone, PartialEq, Eq)]
pub struct NetrcEntry {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for NetrcEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetrcEntry")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Path of the user's netrc file, honouring `$NETRC`
pub fn default_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("NETRC") {
        return Some(PathBuf::from(path));
    }
    let name = if cfg!(windows) { "_netrc" } else { ".netrc" };
    dirs::home_dir().map(|home| home.join(name))
}

/// Look up `host` in the netrc file at `path`
pub fn lookup(path: &Path, host: &str) -> Result<Option<NetrcEntry>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(parse(&content, host))
}

/// Find the entry for `host` in netrc text, falling back to `default`
pub fn parse(content: &str, host: &str) -> Option<NetrcEntry> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut tokens = content.split_whitespace();

    while let Some(token) = tokens.next() {
        match token {
            "machine" => blocks.push(Block::new(tokens.next().map(str::to_string))),
            "default" => blocks.push(Block::new(None)),
            "login" => {
                if let Some(block) = blocks.last_mut() {
                    block.login = tokens.next().map(str::to_string);
                }
            }
            "password" => {
                if let Some(block) = blocks.last_mut() {
                    block.password = tokens.next().map(str::to_string);
                }
            }
            "account" => {
                tokens.next();
            }
            // Macro bodies may contain anything; nothing after one is trusted.
            "macdef" => break,
            _ => {}
        }
    }

    let matching = blocks
        .iter()
        .find(|b| b.machine.as_deref() == Some(host))
        .or_else(|| blocks.iter().find(|b| b.machine.is_none()))?;

    match (&matching.login, &matching.password) {
        (Some(login), Some(password)) => Some(NetrcEntry {
            login: login.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

struct Block {
    machine: Option<String>,
    login: Option<String>,
    password: Option<String>,
}

impl Block {
    fn new(machine: Option<String>) -> Self {
        Self {
            machine,
            login: None,
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETRC: &str = "machine other.example login bob password hunter2\n\
        machine urs.earthdata.nasa.gov\n  login alice\n  password s3cret\n\
        default login anon password guest\n";

    #[test]
    fn test_parse_machine_entry() {
        let entry = parse(NETRC, "urs.earthdata.nasa.gov").unwrap();
        assert_eq!(entry.login, "alice");
        assert_eq!(entry.password, "s3cret");
    }

    #[test]
    fn test_parse_falls_back_to_default() {
        let entry = parse(NETRC, "unknown.example").unwrap();
        assert_eq!(entry.login, "anon");
    }

    #[test]
    fn test_parse_missing_host_without_default() {
        assert!(parse("machine a login x password y", "b").is_none());
    }

    #[test]
    fn test_lookup_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".netrc");
        std::fs::write(&path, NETRC).unwrap();

        let entry = lookup(&path, "other.example").unwrap().unwrap();
        assert_eq!(entry.login, "bob");
        assert!(!format!("{entry:?}").contains("hunter2"));
        assert!(lookup(&dir.path().join("missing"), "x").unwrap().is_none());
    }
}
