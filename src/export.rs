//! Export of ranked results
//!
//! Two thin side effects after a run: a subscription-format text file of the
//! ranked candidates, and a JSON dump keyed by origin feed for cold-start
//! re-import without re-fetching.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Local, Timelike};
use tracing::info;

use crate::error::{Result, TopVpnError};
use crate::manager::ServerManager;
use crate::models::Server;
use crate::parser;

/// One candidate URL per line, fragment replaced with a sequential label.
pub fn generate_subscription<'a, I>(servers: I) -> String
where
    I: IntoIterator<Item = &'a Server>,
{
    servers
        .into_iter()
        .enumerate()
        .map(|(num, server)| {
            let base = server.raw_url.split('#').next().unwrap_or(&server.raw_url);
            format!("{}#server{}", base, num)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write_subscription<'a, I>(servers: I, path: impl AsRef<Path>) -> Result<()>
where
    I: IntoIterator<Item = &'a Server>,
{
    let path = path.as_ref();
    std::fs::write(path, generate_subscription(servers))?;
    info!("Subscription file {} successfully created", path.display());
    Ok(())
}

/// Dump the candidate set as `{origin_url: [raw_url, ...]}` JSON.
pub fn write_servers_dump(
    servers: &[Server],
    dumps_dir: impl AsRef<Path>,
    filename: Option<&str>,
) -> Result<PathBuf> {
    let dumps_dir = dumps_dir.as_ref();
    std::fs::create_dir_all(dumps_dir)?;

    let mut dump: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for server in servers {
        dump.entry(server.origin.as_str())
            .or_default()
            .push(server.raw_url.as_str());
    }

    let filename = filename
        .map(str::to_string)
        .unwrap_or_else(default_dump_filename);
    let path = dumps_dir.join(filename);
    let json = serde_json::to_string(&dump)
        .map_err(|e| TopVpnError::Io(std::io::Error::other(e)))?;
    std::fs::write(&path, json)?;
    info!("Dump file {} successfully created", path.display());
    Ok(path)
}

/// Re-import a dump into a manager through the regular parser (and its
/// dedup/policy rules).
pub fn read_servers_dump(path: impl AsRef<Path>, manager: &mut ServerManager) -> Result<()> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let dump: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
        .map_err(|e| TopVpnError::Io(std::io::Error::other(e)))?;

    for (origin, raw_urls) in &dump {
        for raw_url in raw_urls {
            if let Ok(server) = parser::parse_server_url(raw_url, origin) {
                manager.insert(server);
            }
        }
    }
    info!("Dump file {} successfully loaded", path.display());
    Ok(())
}

fn default_dump_filename() -> String {
    let now = Local::now();
    let seconds_of_day = now.hour() * 3600 + now.minute() * 60 + now.second();
    format!("{}_{}.json", now.format("%d.%m.%Y"), seconds_of_day)
}
