use axum::extract::FromRef;

use crate::job_queue::JobQueue;
use std::time::Instant;

use super::ServerConfig;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub job_queue: JobQueue,
}

impl ServerState {
    pub fn new(config: ServerConfig, job_queue: JobQueue) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            job_queue,
        }
    }
}

impl FromRef<ServerState> for JobQueue {
    fn from_ref(input: &ServerState) -> Self {
        input.job_queue.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
