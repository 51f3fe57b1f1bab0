//! Display-name resolution for ranking rows.

use futures::future::join_all;
use tracing::warn;

use voicetally_core::{LabelResolver, StatKind};

/// Label used when a lookup fails.
pub fn placeholder_label(kind: StatKind) -> &'static str {
    match kind {
        StatKind::Channel => "Unknown Channel",
        StatKind::User => "Unknown User",
    }
}

/// Resolve every id concurrently. Output order matches `ids`; a failed
/// lookup yields the placeholder instead of failing the whole batch.
pub async fn resolve_labels<R>(resolver: &R, kind: StatKind, ids: &[String]) -> Vec<String>
where
    R: LabelResolver + ?Sized,
{
    let lookups = ids.iter().map(|id| async move {
        match resolver.resolve(kind, id).await {
            Ok(label) if !label.trim().is_empty() => label,
            Ok(_) => placeholder_label(kind).to_string(),
            Err(e) => {
                warn!(%kind, id = %id, error = %e, "Label lookup failed; using placeholder");
                placeholder_label(kind).to_string()
            }
        }
    });
    join_all(lookups).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use voicetally_core::{Result, VoiceTallyError};

    struct Names;

    #[async_trait]
    impl LabelResolver for Names {
        async fn resolve(&self, kind: StatKind, id: &str) -> Result<String> {
            match id {
                "missing" => Err(VoiceTallyError::Lookup {
                    kind: kind.to_string(),
                    id: id.to_string(),
                    message: "404 Not Found".into(),
                }),
                "blank" => Ok(String::new()),
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok("Slowpoke".into())
                }
                other => Ok(format!("name-{other}")),
            }
        }
    }

    #[tokio::test]
    async fn preserves_order_and_substitutes_failures() {
        let ids: Vec<String> = ["slow", "a", "missing", "blank"].iter().map(|s| s.to_string()).collect();
        let labels = resolve_labels(&Names, StatKind::User, &ids).await;
        assert_eq!(labels, vec!["Slowpoke", "name-a", "Unknown User", "Unknown User"]);
    }

    #[tokio::test]
    async fn channel_placeholder() {
        let labels = resolve_labels(&Names, StatKind::Channel, &["missing".to_string()]).await;
        assert_eq!(labels, vec!["Unknown Channel"]);
    }

    #[tokio::test]
    async fn lookups_run_concurrently() {
        let ids: Vec<String> = std::iter::repeat("slow".to_string()).take(10).collect();
        let started = std::time::Instant::now();
        resolve_labels(&Names, StatKind::User, &ids).await;
        // ten sequential lookups would take at least 300ms
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
