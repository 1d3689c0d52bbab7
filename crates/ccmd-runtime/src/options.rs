use ccmd_core::User;
use serde::{Deserialize, Serialize};

/// Per-context caps on the action functions that reach the remote client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionLimits {
    pub send_dm: u64,
    pub role_mutations: u64,
    pub reactions: u64,
}

impl Default for ActionLimits {
    fn default() -> Self {
        Self {
            send_dm: 1,
            role_mutations: 10,
            reactions: 20,
        }
    }
}

/// Knobs for one [`crate::Context`]. A zero size limit means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextOptions {
    pub bot_user: User,
    pub random_seed: Option<u32>,
    pub limits: ActionLimits,
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_output_bytes: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            bot_user: User {
                id: 0,
                username: "bot".to_string(),
                discriminator: String::new(),
                bot: true,
            },
            random_seed: None,
            limits: ActionLimits::default(),
            max_operations: 500_000,
            max_call_levels: 32,
            max_string_size: 100_000,
            max_array_size: 10_000,
            max_output_bytes: 100_000,
        }
    }
}
