use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Per-client connection state.
#[derive(Debug)]
pub struct ClientState {
    pub id: u64,
    pub authenticated: bool,
    pub should_close: bool,
    pub name: Option<String>,
    pub commands_processed: u64,
}

impl ClientState {
    pub fn new(authenticated: bool) -> Self {
        ClientState {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            authenticated,
            should_close: false,
            name: None,
            commands_processed: 0,
        }
    }
}

/// Server-wide connection counters reported by INFO.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connected_clients: AtomicU64,
    pub total_connections: AtomicU64,
    pub total_commands: AtomicU64,
}

pub type SharedStats = Arc<ServerStats>;

impl ServerStats {
    pub fn client_connected(&self) {
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        self.connected_clients.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }
}
