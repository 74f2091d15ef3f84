use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub metrics_port: u16,
    /// Prepended to status endpoints returned by enqueue calls.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            metrics_port: 9091,
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    /// Absolute or relative URL clients poll for `request_id`.
    pub fn status_endpoint(&self, request_id: &str) -> String {
        let path = format!("/v1/jobs/status/{}", request_id);
        match &self.public_base_url {
            Some(base) => format!("{}{}", base, path),
            None => path,
        }
    }
}
