//! Fake node binary for generation tests

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Answers `tendermint init`, `init`, `wallet init` and `faucet init` like
/// the real binaries: creates `--home`, writes a baseline `config.toml` and
/// prints the init result as JSON after a log line.
pub(crate) const FAKE_NODE: &str = r#"#!/bin/sh
home=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--home" ]; then home="$arg"; fi
  prev="$arg"
done
if [ -z "$home" ]; then
  echo "missing --home" >&2
  exit 2
fi
mkdir -p "$home/genesis"
echo "initialising $home"
case "$1 $2" in
  "tendermint init")
    printf '[p2p]\nladdr = "tcp://0.0.0.0:26656"\n' > "$home/config.toml"
    id=$(basename "$home")
    printf '{"nodeId":"id-%s","validatorPublicKey":"pk-%s","configFilePath":"%s/config.toml"}\n' "$id" "$id" "$home"
    ;;
  "faucet init")
    printf '[Node]\nPort = 3002\n' > "$home/config.toml"
    printf '{"publicKey":"faucet-pub","configFilePath":"%s/config.toml"}\n' "$home"
    ;;
  *)
    printf '[API]\nPort = 3000\nHost = "0.0.0.0"\n' > "$home/config.toml"
    printf 'Name = "genesis"\n' > "$home/genesis/run-config.toml"
    printf '{"configFilePath":"%s/config.toml"}\n' "$home"
    ;;
esac
"#;

/// Write the fake binary into `dir` and make it executable
pub(crate) fn fake_binary(dir: &Path) -> PathBuf {
    let path = dir.join("fake-node");
    std::fs::write(&path, FAKE_NODE).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
