use std::sync::RwLock;

use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: u64,
    pub display_name: String,
}

/// Identity provider seen from the arcade. The host owns the actual sign-in
/// flow; the session only asks.
#[async_trait]
pub trait Auth: Send + Sync {
    fn is_signed_in(&self) -> bool;
    fn user_id(&self) -> Option<u64>;
    fn display_name(&self) -> Option<String>;
    async fn sign_in(&self) -> bool;

    fn identity(&self) -> Option<Identity> {
        if !self.is_signed_in() {
            return None;
        }
        Some(Identity {
            user_id: self.user_id()?,
            display_name: self.display_name()?,
        })
    }
}

/// Identity handed over by the host. A signed-out instance holds the identity
/// that `sign_in` will activate, or nothing when sign-in must fail.
#[derive(Debug, Default)]
pub struct StaticAuth {
    state: RwLock<AuthState>,
}

#[derive(Debug, Default)]
struct AuthState {
    active: Option<Identity>,
    pending: Option<Identity>,
}

impl StaticAuth {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            state: RwLock::new(AuthState {
                active: Some(identity),
                pending: None,
            }),
        }
    }

    pub fn signed_out(pending: Option<Identity>) -> Self {
        Self {
            state: RwLock::new(AuthState {
                active: None,
                pending,
            }),
        }
    }

    fn active(&self) -> Option<Identity> {
        self.state.read().ok().and_then(|state| state.active.clone())
    }
}

#[async_trait]
impl Auth for StaticAuth {
    fn is_signed_in(&self) -> bool {
        self.active().is_some()
    }

    fn user_id(&self) -> Option<u64> {
        self.active().map(|identity| identity.user_id)
    }

    fn display_name(&self) -> Option<String> {
        self.active().map(|identity| identity.display_name)
    }

    async fn sign_in(&self) -> bool {
        let Ok(mut state) = self.state.write() else {
            return false;
        };
        if state.active.is_some() {
            return true;
        }
        match state.pending.take() {
            Some(identity) => {
                state.active = Some(identity);
                true
            }
            None => false,
        }
    }
}
