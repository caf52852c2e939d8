use crate::config::TopicConfig;
use crate::envelope::ReplyChannel;

/// Resolved key expressions for the gateway channels.
///
/// With the default root `device`:
///
/// ```text
/// device/command    inbound command envelopes
/// device/response   successful replies
/// device/error      failed replies
/// device/@/status   gateway status (running/offline)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub main: String,
    pub command: String,
    pub response: String,
    pub error: String,
}

impl Topics {
    /// Resolve topics from configuration, falling back to `<main>/<channel>`.
    ///
    /// # Example
    /// ```
    /// use devgate_common::{TopicConfig, Topics};
    ///
    /// let topics = Topics::from_config(&TopicConfig::default());
    /// assert_eq!(topics.command, "device/command");
    /// assert_eq!(topics.error, "device/error");
    /// ```
    pub fn from_config(config: &TopicConfig) -> Self {
        let main = config.main.trim_end_matches('/').to_string();
        let channel = |explicit: &Option<String>, name: &str| {
            explicit
                .clone()
                .unwrap_or_else(|| format!("{}/{}", main, name))
        };

        Self {
            command: channel(&config.command, "command"),
            response: channel(&config.response, "response"),
            error: channel(&config.error, "error"),
            main,
        }
    }

    /// Key a reply on `channel` is published to.
    pub fn reply(&self, channel: ReplyChannel) -> &str {
        match channel {
            ReplyChannel::Response => &self.response,
            ReplyChannel::Error => &self.error,
        }
    }

    /// Administrative status key (`<main>/@/status`).
    pub fn status(&self) -> String {
        format!("{}/@/status", self.main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics() {
        let topics = Topics::from_config(&TopicConfig::default());
        assert_eq!(topics.command, "device/command");
        assert_eq!(topics.response, "device/response");
        assert_eq!(topics.error, "device/error");
        assert_eq!(topics.status(), "device/@/status");
        assert_eq!(topics.reply(ReplyChannel::Response), "device/response");
        assert_eq!(topics.reply(ReplyChannel::Error), "device/error");
    }

    #[test]
    fn test_explicit_overrides() {
        let config = TopicConfig {
            main: "plant/line1/".to_string(),
            command: Some("plant/cmd".to_string()),
            response: None,
            error: Some("alarms/gateway".to_string()),
        };
        let topics = Topics::from_config(&config);

        assert_eq!(topics.main, "plant/line1");
        assert_eq!(topics.command, "plant/cmd");
        assert_eq!(topics.response, "plant/line1/response");
        assert_eq!(topics.error, "alarms/gateway");
    }
}
