use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;

use crate::nodes::Endpoint;

/// Endpoints given up-front, either inline or as a file with one `url` or `name url` per line
#[derive(Deserialize, Clone, Debug, Default)]
pub struct PinnedEndpoints {
    file: Option<PathBuf>,
    list: Option<Vec<Endpoint>>,
}

impl PinnedEndpoints {
    pub fn endpoints(&self) -> Option<&[Endpoint]> {
        self.list.as_deref()
    }

    pub(super) fn preload(&mut self) -> Result<()> {
        if self.list.is_some() {
            return Ok(());
        }

        if let Some(file) = &self.file {
            let contents = std::fs::read_to_string(file)?;
            let list = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(parse_line)
                .collect::<Result<Vec<_>>>()?;

            self.list = Some(list);
        }

        Ok(())
    }
}

fn parse_line(line: &str) -> Result<Endpoint> {
    let parts: Vec<_> = line.split_whitespace().collect();

    match parts.as_slice() {
        [url] => Ok(Endpoint::new(*url, *url)),
        [name @ .., url] => Ok(Endpoint::new(name.join(" "), *url)),
        [] => Err(eyre!("empty endpoint line")),
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_preload() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "# public nodes")?;
        writeln!(file, "https://cloudflare-eth.com")?;
        writeln!(file)?;
        writeln!(file, "Flashbots Protect  https://rpc.flashbots.net")?;

        let mut config = PinnedEndpoints {
            file: Some(file.path().to_path_buf()),
            list: None,
        };

        config.preload()?;

        assert_eq!(
            config.endpoints(),
            Some(
                &[
                    Endpoint::new("https://cloudflare-eth.com", "https://cloudflare-eth.com"),
                    Endpoint::new("Flashbots Protect", "https://rpc.flashbots.net"),
                ][..]
            )
        );

        Ok(())
    }

    #[test]
    fn test_inline_list_wins() -> Result<()> {
        let inline = vec![Endpoint::new("local", "http://localhost:8545")];
        let mut config = PinnedEndpoints {
            file: Some(PathBuf::from("/does/not/exist")),
            list: Some(inline.clone()),
        };

        config.preload()?;

        assert_eq!(config.endpoints(), Some(&inline[..]));

        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let mut config = PinnedEndpoints {
            file: Some(PathBuf::from("/does/not/exist")),
            list: None,
        };

        assert!(config.preload().is_err());
    }
}
