//! Chart derivation for query results

use crate::state_machine::{ChartKind, ChartSelection};
use crate::warehouse::Table;
use serde::Serialize;
use serde_json::Value;

pub const CHART_UNAVAILABLE: &str = "At least 2 columns are required";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindOption {
    pub kind: ChartKind,
    pub label: &'static str,
}

/// Chart tab for one result table. `Unavailable` carries no selector state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartView {
    Unavailable {
        message: &'static str,
    },
    Available {
        x_options: Vec<String>,
        /// Every column except `x`
        y_options: Vec<String>,
        x: String,
        y: String,
        kind: ChartKind,
        kind_options: Vec<KindOption>,
        /// `(x, y)` per row, in row order
        series: Vec<(Value, Value)>,
    },
}

/// Build the chart from `table`, honouring `selection` when it still names
/// two distinct columns of the table. Otherwise the first two columns are used.
pub fn chart_view(table: &Table, selection: Option<&ChartSelection>) -> ChartView {
    if table.column_count() < 2 {
        return ChartView::Unavailable {
            message: CHART_UNAVAILABLE,
        };
    }

    let (x, y, kind) = match selection {
        Some(s)
            if s.x != s.y
                && table.column_index(&s.x).is_some()
                && table.column_index(&s.y).is_some() =>
        {
            (s.x.clone(), s.y.clone(), s.kind)
        }
        other => (
            table.columns[0].clone(),
            table.columns[1].clone(),
            other.map(|s| s.kind).unwrap_or_default(),
        ),
    };

    let series = match (table.column_index(&x), table.column_index(&y)) {
        (Some(xi), Some(yi)) => table
            .rows
            .iter()
            .map(|row| {
                (
                    row.get(xi).cloned().unwrap_or(Value::Null),
                    row.get(yi).cloned().unwrap_or(Value::Null),
                )
            })
            .collect(),
        _ => Vec::new(),
    };

    ChartView::Available {
        x_options: table.columns.clone(),
        y_options: table.columns.iter().filter(|c| **c != x).cloned().collect(),
        kind_options: ChartKind::ALL
            .iter()
            .map(|&kind| KindOption {
                kind,
                label: kind.label(),
            })
            .collect(),
        x,
        y,
        kind,
        series,
    }
}
