/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 * - verifier / policy / client_id は起動時に構築、以後 read-only
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::auth::{RoutePolicy, TokenVerifier};

#[derive(Clone, Debug)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub policy: Arc<RoutePolicy>,
    pub client_id: Arc<str>,
}

impl AppState {
    pub fn new(verifier: Arc<TokenVerifier>, policy: RoutePolicy, client_id: &str) -> Self {
        Self {
            verifier,
            policy: Arc::new(policy),
            client_id: Arc::from(client_id),
        }
    }
}
