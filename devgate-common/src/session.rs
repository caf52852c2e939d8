use zenoh::Session;

use crate::config::ZenohConfig;
use crate::error::{Error, Result};

/// Translate a [`ZenohConfig`] into a native Zenoh configuration.
pub fn build_zenoh_config(config: &ZenohConfig) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    let mode_str = match config.mode.as_str() {
        "client" | "peer" | "router" => format!("\"{}\"", config.mode),
        other => {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };

    zenoh_config
        .insert_json5("mode", &mode_str)
        .map_err(|e| Error::Config(format!("Failed to set mode: {}", e)))?;

    for (path, endpoints) in [
        ("connect/endpoints", &config.connect),
        ("listen/endpoints", &config.listen),
    ] {
        if endpoints.is_empty() {
            continue;
        }
        let endpoints_json = serde_json::to_string(endpoints)
            .map_err(|e| Error::Config(format!("Failed to serialize {}: {}", path, e)))?;
        zenoh_config
            .insert_json5(path, &endpoints_json)
            .map_err(|e| Error::Config(format!("Failed to set {}: {}", path, e)))?;
    }

    Ok(zenoh_config)
}

/// Connect to Zenoh using the provided configuration.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    let zenoh_config = build_zenoh_config(config)?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).await?;

    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_mode() {
        let config = ZenohConfig {
            mode: "broker".to_string(),
            ..Default::default()
        };
        let err = build_zenoh_config(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid Zenoh mode: 'broker'"));
    }

    #[test]
    fn test_accepts_client_with_endpoints() {
        let config = ZenohConfig {
            mode: "client".to_string(),
            connect: vec!["tcp/127.0.0.1:7447".to_string()],
            listen: Vec::new(),
        };
        assert!(build_zenoh_config(&config).is_ok());
    }
}
