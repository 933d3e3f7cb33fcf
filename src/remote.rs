//! remote configuration
//!
//! remotes live in the INI-style file at `.asl/config/config` as
//! `[remote "<name>"]` sections carrying `url`, an optional `pushurl`
//! and a fetch refspec.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use url::Url;

use crate::error::{Error, IoResultExt, Result};
use crate::repo::Repository;

/// a configured remote repository
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
    /// defaults to `url`
    pub fetch_url: String,
    /// defaults to `url`, overridden by `pushurl`
    pub push_url: String,
}

/// parsed pieces of a remote URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteUrl {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub user: String,
}

fn config_path(repo: &Repository) -> PathBuf {
    repo.meta_path().join("config/config")
}

/// append a remote section to the config file
pub fn add_remote(repo: &Repository, name: &str, url: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidConfig("remote name cannot be empty".to_string()));
    }
    if url.is_empty() {
        return Err(Error::InvalidConfig("remote URL cannot be empty".to_string()));
    }
    if list_remotes(repo)?.iter().any(|r| r.name == name) {
        return Err(Error::InvalidConfig(format!("remote '{}' already exists", name)));
    }

    let path = config_path(repo);
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .with_path(&path)?;
    write!(
        file,
        "\n[remote \"{name}\"]\n\turl = {url}\n\tfetch = +refs/heads/*:refs/remotes/{name}/*\n"
    )
    .with_path(&path)?;

    Ok(())
}

/// drop a remote's section from the config file
pub fn remove_remote(repo: &Repository, name: &str) -> Result<()> {
    let path = config_path(repo);
    let content = fs::read_to_string(&path).with_path(&path)?;

    let header = format!("[remote \"{}\"]", name);
    let mut kept = Vec::new();
    let mut in_section = false;
    let mut found = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == header {
            in_section = true;
            found = true;
            continue;
        }
        if in_section && trimmed.starts_with('[') {
            in_section = false;
        }
        if !in_section {
            kept.push(line);
        }
    }

    if !found {
        return Err(Error::InvalidConfig(format!("remote '{}' not found", name)));
    }

    fs::write(&path, kept.join("\n")).with_path(&path)?;
    Ok(())
}

/// all configured remotes, in file order
pub fn list_remotes(repo: &Repository) -> Result<Vec<Remote>> {
    let path = config_path(repo);
    let content = fs::read_to_string(&path).with_path(&path)?;

    let mut remotes: Vec<Remote> = Vec::new();
    let mut current: Option<usize> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line
            .strip_prefix("[remote \"")
            .and_then(|rest| rest.strip_suffix("\"]"))
        {
            remotes.push(Remote {
                name: name.to_string(),
                url: String::new(),
                fetch_url: String::new(),
                push_url: String::new(),
            });
            current = Some(remotes.len() - 1);
            continue;
        }
        if line.starts_with('[') {
            current = None;
            continue;
        }

        let Some(idx) = current else { continue };
        let Some((key, value)) = line.split_once('=') else { continue };
        let (key, value) = (key.trim(), value.trim());

        match key {
            "url" => {
                remotes[idx].url = value.to_string();
                if remotes[idx].fetch_url.is_empty() {
                    remotes[idx].fetch_url = value.to_string();
                }
                if remotes[idx].push_url.is_empty() {
                    remotes[idx].push_url = value.to_string();
                }
            }
            "pushurl" => remotes[idx].push_url = value.to_string(),
            _ => {}
        }
    }

    Ok(remotes)
}

/// look up one remote by name
pub fn get_remote(repo: &Repository, name: &str) -> Result<Remote> {
    list_remotes(repo)?
        .into_iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::InvalidConfig(format!("remote '{}' not found", name)))
}

/// split a remote URL into its components
pub fn parse_url(raw: &str) -> Result<RemoteUrl> {
    let parsed = Url::parse(raw)
        .map_err(|e| Error::InvalidConfig(format!("invalid remote url '{}': {}", raw, e)))?;

    Ok(RemoteUrl {
        scheme: parsed.scheme().to_string(),
        host: parsed.host_str().unwrap_or("").to_string(),
        port: parsed.port(),
        path: parsed.path().to_string(),
        user: parsed.username().to_string(),
    })
}
