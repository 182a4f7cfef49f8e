//! SQL panel: statement, provenance, results, summary and feedback

use super::chart::{chart_view, ChartView};
use crate::gateway::Confidence;
use crate::state_machine::{ConversationState, FeedbackRecord};
use crate::summarize::Summarizer;
use crate::warehouse::{QueryCache, QueryOutcome, Table};
use serde::Serialize;

pub const NO_VERIFIED_QUERY: &str =
    "There is no query from the Verified Query Repository used to generate this SQL answer";
pub const NO_DATA: &str = "Query returned no data";
pub const FEEDBACK_SUBMITTED: &str = "Feedback submitted";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfidenceView {
    Verified {
        name: String,
        question: String,
        verified_by: String,
        /// UTC timestamp text
        verified_at: String,
        sql: String,
    },
    Unverified {
        notice: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultsView {
    Error { message: String },
    Empty { message: &'static str },
    Data { table: Table, chart: ChartView },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryView {
    Text { text: String },
    Warning { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackView {
    /// `disabled` while a submission is in flight
    Form { request_id: String, disabled: bool },
    Submitted { message: &'static str },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlPanel {
    pub statement: String,
    pub confidence: Option<ConfidenceView>,
    pub results: ResultsView,
    /// Only present when the results have rows
    pub summary: Option<SummaryView>,
    pub feedback: Option<FeedbackView>,
}

/// Everything needed to lay out one SQL item
pub(super) struct PanelInput<'a> {
    pub statement: &'a str,
    pub confidence: Option<&'a Confidence>,
    pub message_index: usize,
    pub request_id: Option<&'a str>,
}

pub(super) async fn sql_panel(
    input: PanelInput<'_>,
    state: &ConversationState,
    queries: &QueryCache,
    summaries: &Summarizer,
) -> SqlPanel {
    let outcome = queries.execute(input.statement).await;

    let (results, summary) = match outcome.as_ref() {
        QueryOutcome::Failed(error) => (
            ResultsView::Error {
                message: format!("Could not execute generated SQL query. Error: {error}"),
            },
            None,
        ),
        QueryOutcome::Rows(table) if table.is_empty() => {
            (ResultsView::Empty { message: NO_DATA }, None)
        }
        QueryOutcome::Rows(table) => {
            let summary = match summaries.summarize_cached(input.statement, table).await {
                Ok(text) => SummaryView::Text { text },
                Err(e) => {
                    tracing::warn!(error = %e, "Summary failed");
                    SummaryView::Warning {
                        message: format!("Could not generate summary: {e}"),
                    }
                }
            };
            let chart = chart_view(table, state.chart_selections.get(&input.message_index));
            (
                ResultsView::Data {
                    table: table.clone(),
                    chart,
                },
                Some(summary),
            )
        }
    };

    SqlPanel {
        statement: input.statement.to_string(),
        confidence: input.confidence.map(confidence_view),
        results,
        summary,
        feedback: input.request_id.map(|id| feedback_view(id, state)),
    }
}

fn confidence_view(confidence: &Confidence) -> ConfidenceView {
    match &confidence.verified_query_used {
        None => ConfidenceView::Unverified {
            notice: NO_VERIFIED_QUERY,
        },
        Some(verified) => ConfidenceView::Verified {
            name: verified.name.clone(),
            question: verified.question.clone(),
            verified_by: verified.verified_by.clone(),
            verified_at: format_timestamp(verified.verified_at),
            sql: verified.sql.clone(),
        },
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0).map_or_else(
        || secs.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

fn feedback_view(request_id: &str, state: &ConversationState) -> FeedbackView {
    match state.feedback.get(request_id) {
        None => FeedbackView::Form {
            request_id: request_id.to_string(),
            disabled: false,
        },
        Some(FeedbackRecord::Pending) => FeedbackView::Form {
            request_id: request_id.to_string(),
            disabled: true,
        },
        Some(FeedbackRecord::Submitted) => FeedbackView::Submitted {
            message: FEEDBACK_SUBMITTED,
        },
        Some(FeedbackRecord::Failed { error }) => FeedbackView::Failed {
            error: error.clone(),
        },
    }
}
