use std::time::Duration;

/// Settings for one chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub endpoint: String,
    pub initial_prompt: Option<String>,
    /// Longest wait for response headers, an error body, or the next chunk
    /// before the turn fails. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl ChatConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: normalize_endpoint(&endpoint.into()),
            initial_prompt: None,
            read_timeout: None,
        }
    }

    pub fn with_initial_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.initial_prompt = if prompt.trim().is_empty() {
            None
        } else {
            Some(prompt)
        };
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

fn normalize_endpoint(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_normalizes_inputs() {
        let config = ChatConfig::new(" http://localhost:3000/api/chat/ ")
            .with_initial_prompt("   ")
            .with_read_timeout(Duration::from_secs(30));
        assert_eq!(config.endpoint, "http://localhost:3000/api/chat");
        assert_eq!(config.initial_prompt, None);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));

        let config = config.with_initial_prompt("Summarize A/79/123");
        assert_eq!(config.initial_prompt.as_deref(), Some("Summarize A/79/123"));
    }
}
