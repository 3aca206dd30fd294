use serde_json::json;

use crate::api::AppState;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

pub async fn handle(state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    let supervisor = &state.supervisor;

    match supervisor.health_check().await {
        Ok(()) => output_success(
            &output_format,
            &format!("Storage reachable ({})", supervisor.backend_name()),
            Some(json!({
                "backend": supervisor.backend_name(),
                "state": format!("{:?}", supervisor.state()),
            })),
        ),
        Err(e) => {
            output_error(&output_format, &e.to_string(), Some("SERVICE_UNAVAILABLE"))?;
            anyhow::bail!("storage health check failed")
        }
    }
}
