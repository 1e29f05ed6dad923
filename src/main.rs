use anyhow::{bail, Context};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

use x_media_uploader::config;
use x_media_uploader::security::InputValidator;
use x_media_uploader::uploader::{MediaPublisher, ReqwestGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();

    let config = config::load_config().context("Failed to load configuration")?;

    // Initialize logging
    env_logger::Builder::new()
        .parse_filters(&config.log_level)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (file_path, bearer_token, text) = match args.as_slice() {
        [file, token] => (file, token, None),
        [file, token, text @ ..] => (file, token, Some(text.join(" "))),
        _ => bail!("usage: x-media-uploader <video-file> <bearer-token> [post text]"),
    };

    log::info!("Starting X Media Uploader");

    let file_name = Path::new(file_path)
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let content_type = InputValidator::content_type_for_path(file_path);
    let buffer = tokio::fs::read(file_path)
        .await
        .with_context(|| format!("Failed to read {}", file_path))?;

    let gateway = Arc::new(ReqwestGateway::new(config.request_timeout())?);
    let publisher = MediaPublisher::from_config(&config, gateway)?;

    match publisher
        .upload_and_publish(
            Bytes::from(buffer),
            &file_name,
            content_type,
            bearer_token,
            text.as_deref(),
        )
        .await
    {
        Ok(post_id) => {
            println!("{}", post_id);
            Ok(())
        }
        Err(e) => {
            log::error!(
                "Upload of {} failed (retryable: {}): {}",
                file_name,
                e.is_retryable(),
                e
            );
            Err(e.into())
        }
    }
}
