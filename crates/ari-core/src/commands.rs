//! Command body builders
//!
//! Helpers that assemble ARI request bodies. Key order in the produced JSON
//! is not significant.

use serde_json::{Map, Value};

use crate::error::AriResult;
use crate::instance::AppInstance;
use crate::types::{Command, CommandResponse};

/// Serialize string parameters into a JSON object body
pub fn build_body<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let object: Map<String, Value> = params
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();
    Value::Object(object).to_string()
}

/// Optional parameters of a channel playback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayOptions {
    pub lang: Option<String>,
    pub offsetms: Option<String>,
    pub skipms: Option<String>,
    pub playback_id: Option<String>,
}

impl PlayOptions {
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_offset_ms(mut self, offset: u64) -> Self {
        self.offsetms = Some(offset.to_string());
        self
    }

    pub fn with_skip_ms(mut self, skip: u64) -> Self {
        self.skipms = Some(skip.to_string());
        self
    }

    pub fn with_playback_id(mut self, id: impl Into<String>) -> Self {
        self.playback_id = Some(id.into());
        self
    }

    // Empty values are left out of the body
    fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        [
            ("lang", self.lang.as_deref()),
            ("offsetms", self.offsetms.as_deref()),
            ("skipms", self.skipms.as_deref()),
            ("playbackId", self.playback_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (key, v)))
    }
}

/// `POST /channels/{channel_id}/play`
pub fn channel_play(channel_id: &str, media: &str, options: &PlayOptions) -> Command {
    let body = build_body(std::iter::once(("media", media)).chain(options.params()));
    Command::new(format!("/channels/{}/play", channel_id), "POST", body)
}

impl AppInstance {
    /// Start playing `media` on a channel
    pub async fn channel_play(
        &self,
        channel_id: &str,
        media: &str,
        options: &PlayOptions,
    ) -> AriResult<CommandResponse> {
        self.submit(channel_play(channel_id, media, options)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_body_escapes_values() {
        let body = build_body([("media", "sound:hello \"world\"")]);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["media"], "sound:hello \"world\"");
    }

    #[test]
    fn test_build_body_empty() {
        assert_eq!(build_body(std::iter::empty()), "{}");
    }

    #[test]
    fn test_channel_play_command() {
        let options = PlayOptions::default().with_lang("en").with_skip_ms(3000).with_playback_id("");
        let command = channel_play("chan-1", "sound:tt-monkeys", &options);

        assert_eq!(command.url, "/channels/chan-1/play");
        assert_eq!(command.method, "POST");
        assert!(command.unique_id.is_empty());

        let body: Value = serde_json::from_str(&command.body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"media": "sound:tt-monkeys", "lang": "en", "skipms": "3000"})
        );
    }
}
