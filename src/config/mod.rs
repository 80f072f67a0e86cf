pub mod loader;
pub mod schema;

pub use loader::{apply_overrides, get_config_path, load_config};
pub use schema::{AgentConfig, ChannelsConfig, Config, IpcConfig, ProviderConfig, RegistryConfig};
