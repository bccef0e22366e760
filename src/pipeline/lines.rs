//! Line-delimited JSON front end: one intake object per input line,
//! one response object per output line.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::intake::IntakeRequest;
use super::orchestrator::ResultPipeline;
use super::types::{PipelineError, PipelineOutcome};

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LineResponse<'a> {
    Ok {
        outcome: &'a PipelineOutcome,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        kind: &'static str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        lab_result_id: Option<Uuid>,
    },
}

/// Counts reported when the input is exhausted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    pub processed: usize,
    pub rejected: usize,
    pub failed: usize,
}

fn error_kind(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::Intake(_) => "invalid",
        PipelineError::NotFound { .. } => "not_found",
        PipelineError::Consistency { .. } => "consistency",
        PipelineError::Database(_) | PipelineError::Core(_) => "internal",
    }
}

pub async fn serve_lines<R, W>(
    pipeline: &ResultPipeline,
    reader: R,
    mut writer: W,
) -> std::io::Result<LineStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = LineStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let encoded = match serde_json::from_str::<IntakeRequest>(line) {
            Err(e) => {
                stats.rejected += 1;
                serde_json::to_string(&LineResponse::Error {
                    kind: "invalid",
                    message: format!("Malformed request: {e}"),
                    lab_result_id: None,
                })
            }
            Ok(request) => match pipeline.submit_request(&request).await {
                Ok(outcome) => {
                    stats.processed += 1;
                    serde_json::to_string(&LineResponse::Ok { outcome: &outcome })
                }
                Err(err) => {
                    if err.is_client_error() {
                        stats.rejected += 1;
                        tracing::debug!(error = %err, "Submission rejected");
                    } else {
                        stats.failed += 1;
                        tracing::error!(error = %err, "Submission failed");
                    }
                    serde_json::to_string(&LineResponse::Error {
                        kind: error_kind(&err),
                        message: err.to_string(),
                        lab_result_id: err.recorded_result(),
                    })
                }
            },
        }
        .map_err(std::io::Error::other)?;

        writer.write_all(encoded.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(stats)
}
