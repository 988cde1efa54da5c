//! Integration tests for codepad
//!
//! `orchestration` and `config_loading` only need a POSIX shell. The
//! end-to-end scenarios need python3, javac/java and g++ on PATH:
//!   cargo test -p codepad --features toolchain-tests

use std::fs;
use std::path::Path;

use codepad::config::Config;

mod config_loading;
mod orchestration;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Config with shell-based toolchains, rooted at `root`
pub(crate) fn shell_config(root: &Path, timeout: f64) -> Config {
    let toml = format!(
        r#"
timeout = {timeout:?}
kill_grace = 1.0

[toolchains.shell]
name = "POSIX shell"
extension = "sh"

[toolchains.shell.run]
command = ["sh", "{{source}}"]

[toolchains.checked]
name = "POSIX shell, syntax checked"
extension = "sh"

[[toolchains.checked.build]]
command = ["sh", "-n", "{{source}}"]

[[toolchains.checked.build]]
command = ["cp", "{{source}}", "{{binary}}"]
artifacts = ["{{binary}}"]

[toolchains.checked.run]
command = ["sh", "{{binary}}"]

[toolchains.named]
name = "Named entry"
extension = "sh"
source_name = "{{symbol}}.sh"

[toolchains.named.entry_symbol]
pattern = '#\s*entry:\s*(\w+)'
default = "Main"

[toolchains.named.run]
command = ["sh", "{{source}}", "{{symbol}}"]

[toolchains.missing]
name = "Missing compiler"
extension = "x"

[toolchains.missing.preflight]
command = ["codepad-missing-compiler-xyz", "--version"]
message = "compiler is not installed"
remediation = "install the compiler"

[toolchains.missing.run]
command = ["codepad-missing-compiler-xyz", "{{source}}"]

[toolchains.broken]
name = "Interpreter without preflight"
extension = "x"

[toolchains.broken.run]
command = ["codepad-missing-interpreter-xyz", "{{source}}"]
"#
    );

    let mut config = Config::parse_toml(&toml).expect("test config should be valid");
    config.workspace_root = root.to_path_buf();
    config
}

/// Number of entries left under a workspace root
pub(crate) fn leftover_entries(root: &Path) -> usize {
    match fs::read_dir(root) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}
