// src/main.rs
use episode_identifier::config::manager::ConfigManager;
use episode_identifier::config::source::{ArgsSource, EnvSource, FileSource, default_config_path};

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut manager = ConfigManager::new()
        .add_source(Box::new(FileSource::new(default_config_path())))
        .add_source(Box::new(EnvSource::new("EPID_")))
        .add_source(Box::new(ArgsSource::new(serde_json::Value::Object(
            Default::default(),
        ))));

    if let Err(e) = manager.load_and_publish() {
        eprintln!("configuration failed to load: {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    if let Err(e) = manager.watch() {
        log::warn!("configuration hot-reload unavailable: {}", e.user_friendly_message());
    }

    let config_handle = manager.snapshot();

    let result = episode_identifier::cli::run(&config_handle).await;
    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    }
}
