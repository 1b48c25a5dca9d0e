use std::collections::HashSet;

use tracing::{debug, info};

use crate::client::Destination;
use crate::frame::Frame;
use crate::{Result, TapError};

const WRITE_FLAG: &str = "write";

/// Names of the commands which mutate state, stored lower-case.
///
/// Built once at startup and shared read-only by the workers afterwards.
#[derive(Debug, Clone, Default)]
pub struct WriteCommands {
    names: HashSet<String>,
}

impl WriteCommands {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Case-insensitive membership test.
    pub fn is_write(&self, name: &str) -> bool {
        // Catalog names are lower-case, avoid allocating in the common case.
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.names.contains(&name.to_lowercase())
        } else {
            self.names.contains(name)
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sorted list of the names, used for logging.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Select the commands flagged `write` from a `COMMAND` reply.
    ///
    /// Each catalog entry is an array whose first element is the command
    /// name and third element the list of flags. Entries not matching that
    /// shape are skipped.
    pub fn from_catalog(catalog: &Frame) -> Result<Self> {
        let entries = match catalog {
            Frame::Array(entries) => entries,
            other => {
                return Err(TapError::UnexpectedReply {
                    command: "COMMAND".to_string(),
                    reply: other.to_string(),
                })
            }
        };

        let mut names = HashSet::new();
        for entry in entries {
            let Frame::Array(detail) = entry else {
                debug!(?entry, "Skipping malformed catalog entry");
                continue;
            };
            let (Some(name), Some(Frame::Array(flags))) =
                (detail.first().and_then(Frame::as_text), detail.get(2))
            else {
                debug!(?entry, "Skipping catalog entry without name or flags");
                continue;
            };

            if flags
                .iter()
                .any(|flag| flag.as_text().as_deref() == Some(WRITE_FLAG))
            {
                names.insert(name.to_lowercase());
            }
        }

        Ok(Self { names })
    }

    /// Query the command catalog of `store` and build the write command set.
    pub async fn fetch<D: Destination>(store: &D) -> Result<Self> {
        let catalog = store.call(vec!["COMMAND".to_string()]).await?;
        let commands = Self::from_catalog(&catalog)?;
        info!(
            count = commands.len(),
            "Write commands: {}",
            commands.names().join(", ")
        );
        Ok(commands)
    }
}
