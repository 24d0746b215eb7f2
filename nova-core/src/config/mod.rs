pub use nova_kernel::config::*;

mod load;

pub use load::{
    base_config_dir, env_config_path, global_config_path, load_config, load_config_layer_from_path,
    load_config_layer_from_str, project_config_path, FileFormat,
};

#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(test)]
static CONFIG_TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serializes tests that touch config-related environment variables.
#[cfg(test)]
pub fn test_config_lock() -> &'static Mutex<()> {
    CONFIG_TEST_LOCK.get_or_init(|| Mutex::new(()))
}
