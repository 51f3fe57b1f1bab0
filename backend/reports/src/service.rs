use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use voicetally_core::{
    ChartBar, ChartRenderer, ChartSpec, LabelResolver, RenderedChart, Result, Rgb, SessionStore,
    StatKind, DEFAULT_TOP_LIMIT,
};
use voicetally_tracker::AggregationEngine;

use crate::labels::resolve_labels;
use crate::messages::Messages;

const CHART_WIDTH: u32 = 800;
const CHART_HEIGHT: u32 = 600;

/// A `/voicestats` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub group_id: String,
    pub kind: StatKind,
}

/// One resolved ranking row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub key: String,
    pub label: String,
    pub hours: f64,
}

/// What to send back to the requester. Never an error: failures are
/// already converted to a localized message.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportReply {
    Chart {
        chart: RenderedChart,
        rows: Vec<ReportRow>,
    },
    NoData(String),
    Error(String),
}

pub struct ReportService<S> {
    engine: AggregationEngine<S>,
    renderer: Arc<dyn ChartRenderer>,
    messages: Messages,
    limit: usize,
}

impl<S> ReportService<S>
where
    S: SessionStore + 'static,
{
    pub fn new(store: Arc<S>, renderer: Arc<dyn ChartRenderer>, messages: Messages) -> Self {
        Self {
            engine: AggregationEngine::new(store),
            renderer,
            messages,
            limit: DEFAULT_TOP_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.engine = self.engine.with_timeout(timeout);
        self
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Build the reply for `request`, logging (not exposing) any internal failure.
    pub async fn generate(&self, request: &ReportRequest, resolver: &dyn LabelResolver) -> ReportReply {
        match self.try_generate(request, resolver).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    group_id = %request.group_id,
                    kind = %request.kind,
                    error = %e,
                    "Report generation failed"
                );
                ReportReply::Error(self.messages.report_error(request.kind).to_string())
            }
        }
    }

    async fn try_generate(&self, request: &ReportRequest, resolver: &dyn LabelResolver) -> Result<ReportReply> {
        let totals = self
            .engine
            .top(request.kind, &request.group_id, self.limit)
            .await?;
        if totals.is_empty() {
            return Ok(ReportReply::NoData(self.messages.no_data().to_string()));
        }

        let ids: Vec<String> = totals.iter().map(|t| t.key.clone()).collect();
        let labels = resolve_labels(resolver, request.kind, &ids).await;

        let rows: Vec<ReportRow> = totals
            .iter()
            .zip(labels)
            .map(|(total, label)| ReportRow {
                key: total.key.clone(),
                label,
                hours: total.hours(),
            })
            .collect();

        let chart = self.renderer.render(&self.chart_spec(request.kind, &rows))?;
        info!(
            group_id = %request.group_id,
            kind = %request.kind,
            rows = rows.len(),
            bytes = chart.bytes.len(),
            "Report generated"
        );
        Ok(ReportReply::Chart { chart, rows })
    }

    fn chart_spec(&self, kind: StatKind, rows: &[ReportRow]) -> ChartSpec {
        let color = match kind {
            StatKind::Channel => Rgb(54, 162, 235),
            StatKind::User => Rgb(255, 99, 132),
        };
        ChartSpec {
            title: self.messages.chart_title().to_string(),
            y_axis_label: self.messages.y_axis_label().to_string(),
            dataset_label: self.messages.dataset_label().to_string(),
            value_suffix: self.messages.hours_suffix().to_string(),
            color,
            width: CHART_WIDTH,
            height: CHART_HEIGHT,
            bars: rows
                .iter()
                .map(|r| ChartBar {
                    label: r.label.clone(),
                    hours: r.hours,
                })
                .collect(),
            file_stem: format!("{}_stats", kind.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voicetally_core::{PresenceEvent, VoiceTallyError};
    use voicetally_store::InMemoryStore;
    use voicetally_tracker::PresenceProcessor;

    use crate::messages::Locale;
    use crate::png::PngBarChart;

    struct Names;

    #[async_trait]
    impl LabelResolver for Names {
        async fn resolve(&self, kind: StatKind, id: &str) -> Result<String> {
            if id == "u-gone" {
                return Err(VoiceTallyError::Lookup {
                    kind: kind.to_string(),
                    id: id.into(),
                    message: "unknown user".into(),
                });
            }
            Ok(format!("#{id}"))
        }
    }

    struct FailingRenderer;

    impl ChartRenderer for FailingRenderer {
        fn render(&self, _: &ChartSpec) -> Result<RenderedChart> {
            Err(VoiceTallyError::Render("font missing".into()))
        }
    }

    async fn store_with_activity() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let p = PresenceProcessor::new(Arc::clone(&store));
        p.apply(&PresenceEvent::join("lobby", "u1", "G", 0)).await.unwrap();
        p.apply(&PresenceEvent::leave("lobby", "u1", "G", 7_200_000)).await.unwrap();
        p.apply(&PresenceEvent::join("games", "u-gone", "G", 0)).await.unwrap();
        p.apply(&PresenceEvent::leave("games", "u-gone", "G", 1_800_000)).await.unwrap();
        store
    }

    fn request(kind: StatKind) -> ReportRequest {
        ReportRequest {
            group_id: "G".into(),
            kind,
        }
    }

    #[tokio::test]
    async fn channel_report_has_hours_and_labels() {
        let service = ReportService::new(
            store_with_activity().await,
            Arc::new(PngBarChart::new()),
            Messages::default(),
        );
        let reply = service.generate(&request(StatKind::Channel), &Names).await;
        let ReportReply::Chart { chart, rows } = reply else {
            panic!("expected chart, got {reply:?}");
        };
        assert_eq!(chart.file_name, "channel_stats.png");
        assert_eq!(chart.content_type, "image/png");
        assert!(chart.bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
        assert_eq!(rows[0].label, "#lobby");
        assert!((rows[0].hours - 2.0).abs() < 1e-9);
        assert!((rows[1].hours - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_lookup_uses_placeholder() {
        let service = ReportService::new(
            store_with_activity().await,
            Arc::new(PngBarChart::new()),
            Messages::default(),
        );
        let reply = service.generate(&request(StatKind::User), &Names).await;
        let ReportReply::Chart { chart, rows } = reply else {
            panic!("expected chart");
        };
        assert_eq!(chart.file_name, "user_stats.png");
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["#u1", "Unknown User"]);
    }

    #[tokio::test]
    async fn empty_group_gets_no_data_message() {
        let service = ReportService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(PngBarChart::new()),
            Messages::new(Locale::Ja),
        );
        let reply = service.generate(&request(StatKind::Channel), &Names).await;
        assert_eq!(
            reply,
            ReportReply::NoData("このサーバーにはまだデータがありません。".into())
        );
    }

    #[tokio::test]
    async fn render_failure_becomes_localized_error() {
        let service = ReportService::new(
            store_with_activity().await,
            Arc::new(FailingRenderer),
            Messages::new(Locale::En),
        );
        let reply = service.generate(&request(StatKind::User), &Names).await;
        assert_eq!(
            reply,
            ReportReply::Error("Failed to generate user statistics.".into())
        );
    }

    #[tokio::test]
    async fn storage_failure_becomes_localized_error() {
        let store = store_with_activity().await;
        store.close().await.unwrap();
        let service = ReportService::new(store, Arc::new(PngBarChart::new()), Messages::default());
        let reply = service.generate(&request(StatKind::Channel), &Names).await;
        assert_eq!(
            reply,
            ReportReply::Error("チャンネル統計の生成中にエラーが発生しました。".into())
        );
    }

    #[tokio::test]
    async fn limit_is_respected() {
        let service = ReportService::new(
            store_with_activity().await,
            Arc::new(PngBarChart::new()),
            Messages::default(),
        )
        .with_limit(1);
        let ReportReply::Chart { rows, .. } = service.generate(&request(StatKind::Channel), &Names).await else {
            panic!("expected chart");
        };
        assert_eq!(rows.len(), 1);
    }
}
