//! Source heuristics to weed out findings on functions that aren't callable by anyone
//!
//! These are regex checks over flattened Solidity sources, not a parser. They err on the side of
//! keeping a finding

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static OWNER_COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)msg\.sender\s*==\s*owner|owner\s*==\s*msg\.sender|hasRole\s*\(").unwrap()
});

/// All `.sol` files under a directory, recursively
#[derive(Debug, Default)]
pub struct SoliditySources {
    files: Vec<String>,
}

impl SoliditySources {
    /// Unreadable files and a missing directory are skipped, not errors
    pub fn load(dir: &Path) -> Self {
        let mut files = vec![];
        collect(dir, &mut files);
        Self { files }
    }

    #[cfg(test)]
    pub fn from_files(files: Vec<String>) -> Self {
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Declared `private` or `internal`
    pub fn is_nonpublic(&self, function: &str) -> bool {
        self.matches(
            r"(?i)function\s+{}\b[^)]*\)\s+(private|internal)\b",
            function,
        )
    }

    /// Declared with an `onlyOwner`, `onlyAdmin` or `onlyRole` modifier right after its visibility
    pub fn has_modifier_guard(&self, function: &str) -> bool {
        self.matches(
            r"(?i)function\s+{}\b[^)]*\)\s*(public|external)\s+(onlyOwner|onlyAdmin|onlyRole)\b",
            function,
        )
    }

    /// Compares `msg.sender` against `owner`, or checks a role, somewhere in its body
    pub fn has_manual_owner_check(&self, function: &str) -> bool {
        let Some(header) = function_regex(
            r"(?i)function\s+{}\b[^)]*\)\s*(public|external)\s*[^{]*\{",
            function,
        ) else {
            return false;
        };

        self.files.iter().any(|code| {
            header
                .find(code)
                .map(|m| function_body(code, m.end() - 1))
                .is_some_and(|body| OWNER_COMPARISON.is_match(body))
        })
    }

    fn matches(&self, template: &str, function: &str) -> bool {
        function_regex(template, function)
            .is_some_and(|re| self.files.iter().any(|code| re.is_match(code)))
    }
}

fn function_regex(template: &str, function: &str) -> Option<Regex> {
    if function.is_empty() {
        return None;
    }

    Regex::new(&template.replace("{}", &regex::escape(function))).ok()
}

/// From the opening brace at `start` to its matching closing brace, or the end of the file
fn function_body(code: &str, start: usize) -> &str {
    let mut depth = 0usize;

    for (i, c) in code[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &code[start..=start + i];
                }
            }
            _ => {}
        }
    }

    &code[start..]
}

fn collect(dir: &Path, files: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        trace!(dir = %dir.display(), "no sources");
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "sol") {
            if let Ok(code) = std::fs::read_to_string(&path) {
                files.push(code);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn vault() -> SoliditySources {
        SoliditySources::from_files(vec![r#"
            pragma solidity ^0.8.0;

            contract Vault {
                address public owner;

                function sweep(address payable to) public {
                    to.transfer(address(this).balance);
                }

                function drain(address payable to) external onlyOwner {
                    to.transfer(address(this).balance);
                }

                function rescue(address payable to) public {
                    if (true) {
                        to.transfer(1);
                    }
                    require(msg.sender == owner, "not owner");
                    to.transfer(address(this).balance);
                }

                function grant(address payable to) external {
                    require(hasRole(ADMIN, msg.sender));
                    to.transfer(address(this).balance);
                }

                function _pay(address payable to) internal {
                    to.transfer(address(this).balance);
                }

                function skim(address payable to) private {
                    to.transfer(1);
                }
            }
        "#
        .to_owned()])
    }

    #[rstest]
    #[case("sweep", false)]
    #[case("_pay", true)]
    #[case("skim", true)]
    #[case("missing", false)]
    #[case("", false)]
    fn test_is_nonpublic(vault: SoliditySources, #[case] function: &str, #[case] expected: bool) {
        assert_eq!(vault.is_nonpublic(function), expected);
    }

    #[rstest]
    #[case("sweep", false)]
    #[case("drain", true)]
    #[case("rescue", false)]
    fn test_has_modifier_guard(
        vault: SoliditySources,
        #[case] function: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(vault.has_modifier_guard(function), expected);
    }

    #[rstest]
    #[case("sweep", false)]
    #[case("rescue", true)]
    #[case("grant", true)]
    #[case("_pay", false)]
    fn test_has_manual_owner_check(
        vault: SoliditySources,
        #[case] function: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(vault.has_manual_owner_check(function), expected);
    }

    #[test]
    fn test_body_stops_at_matching_brace() {
        let code = "function a() public { if (x) { y(); } } function b() public { owner == msg.sender; }";
        let start = code.find('{').unwrap();

        assert_eq!(function_body(code, start), "{ if (x) { y(); } }");
    }

    #[test]
    fn test_load_recursively() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("contracts/lib"))?;
        std::fs::write(
            dir.path().join("contracts/lib/Owned.sol"),
            "function kill() internal {}",
        )?;
        std::fs::write(dir.path().join("README.md"), "function kill() internal {}")?;

        let sources = SoliditySources::load(dir.path());

        assert_eq!(sources.files.len(), 1);
        assert!(sources.is_nonpublic("kill"));

        Ok(())
    }

    #[test]
    fn test_load_missing_dir() {
        assert!(SoliditySources::load(Path::new("/does/not/exist")).is_empty());
    }
}
