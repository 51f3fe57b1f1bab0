//! `voicetally stats`: print a ranking straight from the database.

use std::sync::Arc;

use anyhow::Result;

use voicetally_core::{RankedTotal, SessionStore, StatKind};
use voicetally_tracker::AggregationEngine;

use crate::terminal_output::{render_table, Column};

pub async fn run<S>(store: Arc<S>, guild_id: &str, kind: StatKind, limit: usize) -> Result<()>
where
    S: SessionStore + 'static,
{
    let rows = AggregationEngine::new(store).top(kind, guild_id, limit).await?;
    if rows.is_empty() {
        println!("No recorded voice time for guild {guild_id}.");
    } else {
        print!("{}", format_ranking(kind, &rows));
    }
    Ok(())
}

pub fn format_ranking(kind: StatKind, rows: &[RankedTotal]) -> String {
    let header = match kind {
        StatKind::Channel => "Channel",
        StatKind::User => "User",
    };
    let columns = vec![Column::right("#"), Column::left(header), Column::right("Hours")];
    let cells: Vec<Vec<String>> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| vec![(i + 1).to_string(), row.key.clone(), format!("{:.2}", row.hours())])
        .collect();
    render_table(&columns, &cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicetally_core::MS_PER_HOUR;

    #[test]
    fn ranking_shows_rank_and_hours() {
        let rows = vec![
            RankedTotal::new("111", 3 * MS_PER_HOUR),
            RankedTotal::new("222", MS_PER_HOUR / 4),
        ];
        let out = format_ranking(StatKind::Channel, &rows);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains("Channel"));
        assert!(lines[2].starts_with("  1  111"));
        assert!(lines[2].ends_with("3.00"));
        assert!(lines[3].ends_with("0.25"));
    }
}
