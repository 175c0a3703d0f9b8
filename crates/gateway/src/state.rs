use std::{sync::Arc, time::Instant};

use {secrecy::Secret, wagate_sessions::SessionSupervisor};

/// Shared state behind every route.
pub struct GatewayState {
    pub supervisor: SessionSupervisor,
    /// `None` disables the admin routes.
    pub admin_token: Option<Secret<String>>,
    pub version: String,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(supervisor: SessionSupervisor, admin_token: Option<Secret<String>>) -> Arc<Self> {
        Arc::new(Self {
            supervisor,
            admin_token,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
