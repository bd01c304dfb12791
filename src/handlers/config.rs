use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Render the configuration for API responses with credentials redacted.
fn config_json(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "openai": {
            "api_key": if config.openai.api_key.is_empty() { "" } else { "***" },
            "transcription_model": config.openai.transcription_model,
            "chat_model": config.openai.chat_model,
            "tts_model": config.openai.tts_model,
            "tts_voice": config.openai.tts_voice,
            "temperature": config.openai.temperature,
            "max_tokens": config.openai.max_tokens
        },
        "session": {
            "heartbeat_interval_secs": config.session.heartbeat_interval_secs,
            "max_concurrent_sessions": config.session.max_concurrent_sessions
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_json(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_json(&current_config)
    })))
}
