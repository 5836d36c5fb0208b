//! Cassette loading.

use std::path::Path;

use super::format::Cassette;
use super::replayer::CassetteReplayer;
use crate::error::TatttyError;

/// Load a YAML cassette and wrap it in a replayer.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_cassette(path: &Path) -> Result<CassetteReplayer, TatttyError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TatttyError::Config(format!("Failed to read cassette file {}: {e}", path.display()))
    })?;
    let cassette: Cassette = serde_yaml::from_str(&content).map_err(|e| {
        TatttyError::Config(format!("Failed to parse cassette file {}: {e}", path.display()))
    })?;
    tracing::debug!(
        path = %path.display(),
        interactions = cassette.interactions.len(),
        "loaded cassette"
    );
    Ok(CassetteReplayer::new(&cassette))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_hand_written_cassette() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.cassette.yaml");
        std::fs::write(
            &path,
            r#"name: prompt
recorded_at: 2026-01-01T00:00:00Z
commit: abc
interactions:
  - seq: 0
    port: chat_completer
    method: complete
    input: {}
    output:
      Ok:
        content: a koi
"#,
        )
        .unwrap();

        let mut replayer = load_cassette(&path).unwrap();
        let interaction = replayer.next_interaction("chat_completer", "complete").unwrap();
        assert_eq!(interaction.output["Ok"]["content"], "a koi");
    }

    #[test]
    fn load_nonexistent_fails() {
        assert!(load_cassette(Path::new("/nonexistent/cassette.yaml")).is_err());
    }
}
