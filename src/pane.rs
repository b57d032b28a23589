use std::cmp::Ordering;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace};

use crate::config::PaneConfig;
use crate::domain::{Effect, MIN_INTERVAL_MS, PaneId};
use crate::format::{format_cell, plain_text};
use crate::protocol::{PushMessage, Row};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortState {
    pub column: usize,
    pub ascending: bool,
}

/// One table bound to one server side index.
///
/// The pane owns all state of the view but performs no I/O. Operations that
/// need a socket, a timer or a request return [`Effect`]s for the runtime.
#[derive(Debug)]
pub struct Pane {
    id: PaneId,
    title: String,
    index: String,
    columns: Vec<String>,
    rows: Vec<Row>, // Retained rows in receipt order, at most max_rows
    order: Vec<usize>, // Display position -> index into rows
    auto_refresh: bool,
    interval_ms: u64,
    max_rows: usize,
    connection: ConnectionState,
    status_message: String,
    trigger_failed: bool,
    sort: Option<SortState>,
    selected_row: usize,
    selected_column: usize,
    follow: bool,
    mounted: bool,
}

/// Render ready snapshot of a pane, independent of any terminal library.
#[derive(Debug, Clone, PartialEq)]
pub struct PaneView {
    pub title: String,
    pub index: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub auto_refresh: bool,
    pub interval_ms: u64,
    pub connection: ConnectionState,
    pub status_message: String,
    pub selected_row: usize,
    pub selected_column: usize,
    pub sort: Option<SortState>,
    pub follow: bool,
}

impl Pane {
    pub fn new(id: PaneId, config: &PaneConfig) -> Self {
        Self {
            id,
            title: config.title.clone().unwrap_or_else(|| config.index.clone()),
            index: config.index.clone(),
            columns: Vec::new(),
            rows: Vec::new(),
            order: Vec::new(),
            auto_refresh: config.auto_refresh,
            interval_ms: config.interval_ms.max(MIN_INTERVAL_MS),
            max_rows: config.max_rows.max(1),
            connection: ConnectionState::Idle,
            status_message: String::from("waiting for data"),
            trigger_failed: false,
            sort: None,
            selected_row: 0,
            selected_column: 0,
            follow: true,
            mounted: false,
        }
    }

    // -------------------- Lifecycle ---------------------- //

    pub fn mount(&mut self) -> Vec<Effect> {
        self.mounted = true;
        let mut effects = vec![Effect::OpenChannel(self.id)];
        if self.auto_refresh {
            effects.extend(self.start_timer());
        }
        debug!("Pane {} mounted: {effects:?}", self.id);
        effects
    }

    pub fn dispose(&mut self) -> Vec<Effect> {
        self.mounted = false;
        vec![Effect::StopTimer(self.id), Effect::CloseChannel(self.id)]
    }

    pub fn tick(&mut self) -> Option<Effect> {
        if !self.mounted || !self.auto_refresh {
            return None;
        }
        self.trigger()
    }

    /// Applies a push message if it targets this pane's index.
    pub fn receive_push(&mut self, message: PushMessage) -> bool {
        if message.index() != self.index {
            trace!(
                "Pane {} ignores message for index {}",
                self.id,
                message.index()
            );
            return false;
        }
        let PushMessage::Rows(message) = message;
        let columns = message.resolve_columns();
        if columns != self.columns {
            debug!("Pane {} columns changed to {columns:?}", self.id);
            self.columns = columns;
            self.sort = None;
            self.selected_column = self
                .selected_column
                .min(self.columns.len().saturating_sub(1));
        }

        let mut rows = message.rows;
        if rows.len() > self.max_rows {
            rows.drain(..rows.len() - self.max_rows);
        }
        self.rows = rows;
        self.rebuild_order();
        self.set_status_message(format!("received {} rows", self.rows.len()));
        true
    }

    pub fn render(&self) -> PaneView {
        let rows = self
            .order
            .iter()
            .map(|&ridx| {
                let row = &self.rows[ridx];
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(pos, name)| row.get(name).map(|v| format_cell(v, pos)).unwrap_or_default())
                    .collect()
            })
            .collect();
        PaneView {
            title: self.title.clone(),
            index: self.index.clone(),
            columns: self.columns.clone(),
            rows,
            auto_refresh: self.auto_refresh,
            interval_ms: self.interval_ms,
            connection: self.connection,
            status_message: self.status_message.clone(),
            selected_row: self.selected_row,
            selected_column: self.selected_column,
            sort: self.sort,
            follow: self.follow,
        }
    }

    // -------------------- Refresh control ---------------------- //

    pub fn toggle_auto_refresh(&mut self) -> Vec<Effect> {
        self.auto_refresh = !self.auto_refresh;
        info!("Pane {} auto refresh {}", self.id, self.auto_refresh);
        if self.auto_refresh {
            self.start_timer()
        } else {
            vec![Effect::StopTimer(self.id)]
        }
    }

    pub fn set_interval(&mut self, interval_ms: u64) -> Vec<Effect> {
        let interval_ms = interval_ms.max(MIN_INTERVAL_MS);
        if interval_ms == self.interval_ms {
            return Vec::new();
        }
        self.interval_ms = interval_ms;
        self.set_status_message(format!("interval {interval_ms}ms"));
        if self.auto_refresh && self.mounted {
            self.start_timer()
        } else {
            Vec::new()
        }
    }

    pub fn refresh_now(&mut self) -> Vec<Effect> {
        let effect = self.trigger();
        if effect.is_some() {
            self.set_status_message(format!("refresh requested for {}", self.index));
        }
        effect.into_iter().collect()
    }

    /// Binds the pane to another index. Rows of the old index are dropped.
    pub fn rebind(&mut self, index: &str) -> Vec<Effect> {
        let index = index.trim();
        if index == self.index {
            return Vec::new();
        }
        info!("Pane {} rebound from {} to {index}", self.id, self.index);
        if self.title == self.index {
            self.title = index.to_string();
        }
        self.index = index.to_string();
        self.columns.clear();
        self.rows.clear();
        self.sort = None;
        self.selected_column = 0;
        self.rebuild_order();
        self.set_status_message(format!("bound to {index}"));
        if self.auto_refresh && self.mounted {
            self.trigger().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.rebuild_order();
        self.set_status_message("table cleared");
    }

    pub fn on_trigger_completed(&mut self, result: Result<(), String>) {
        match result {
            Ok(()) => {
                if self.trigger_failed {
                    self.trigger_failed = false;
                    self.set_status_message("refresh ok");
                }
            }
            Err(reason) => {
                self.trigger_failed = true;
                self.set_status_message(format!("refresh failed: {reason}"));
            }
        }
    }

    pub fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            info!("Pane {} channel {:?} -> {:?}", self.id, self.connection, state);
            self.connection = state;
        }
    }

    fn start_timer(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::StartTimer(
            self.id,
            Duration::from_millis(self.interval_ms),
        )];
        effects.extend(self.trigger());
        effects
    }

    fn trigger(&mut self) -> Option<Effect> {
        if self.index.is_empty() {
            self.set_status_message("no index bound");
            return None;
        }
        Some(Effect::Trigger(self.id, self.index.clone()))
    }

    // -------------------- Sorting ---------------------- //

    pub fn sort_by_selected(&mut self) {
        let Some(name) = self.columns.get(self.selected_column) else {
            return;
        };
        let ascending = match self.sort {
            Some(s) if s.column == self.selected_column => !s.ascending,
            _ => true,
        };
        self.sort = Some(SortState {
            column: self.selected_column,
            ascending,
        });
        self.follow = false;
        let direction = if ascending { "ascending" } else { "descending" };
        self.set_status_message(format!("sorted by {name} {direction}"));
        self.rebuild_order();
    }

    pub fn reset_sort(&mut self) {
        self.sort = None;
        self.follow = true;
        self.set_status_message("sort reset");
        self.rebuild_order();
    }

    fn rebuild_order(&mut self) {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        if let Some(sort) = self.sort
            && let Some(name) = self.columns.get(sort.column)
        {
            let rows = &self.rows;
            order.sort_by(|&a, &b| {
                let ord = compare_values(rows[a].get(name), rows[b].get(name));
                if sort.ascending { ord } else { ord.reverse() }
            });
        }
        self.order = order;
        if self.follow && self.sort.is_none() {
            self.selected_row = self.order.len().saturating_sub(1);
        } else {
            self.selected_row = self.selected_row.min(self.order.len().saturating_sub(1));
        }
    }

    // -------------------- Selection ---------------------- //

    pub fn move_selection_up(&mut self, size: usize) {
        self.follow = false;
        self.selected_row = self.selected_row.saturating_sub(size);
    }

    pub fn move_selection_down(&mut self, size: usize) {
        let last = self.order.len().saturating_sub(1);
        self.selected_row = (self.selected_row + size).min(last);
    }

    pub fn move_selection_beginning(&mut self) {
        self.follow = false;
        self.selected_row = 0;
    }

    /// Jumps to the last row and keeps following new rows.
    pub fn move_selection_end(&mut self) {
        self.follow = true;
        self.selected_row = self.order.len().saturating_sub(1);
    }

    pub fn move_selection_left(&mut self) {
        self.selected_column = self.selected_column.saturating_sub(1);
    }

    pub fn move_selection_right(&mut self) {
        if self.selected_column + 1 < self.columns.len() {
            self.selected_column += 1;
        }
    }

    /// Tab separated text of the selected row, as displayed.
    pub fn selected_row_text(&self) -> Option<String> {
        let ridx = *self.order.get(self.selected_row)?;
        let row = &self.rows[ridx];
        let cells: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(pos, name)| row.get(name).map(|v| format_cell(v, pos)).unwrap_or_default())
            .collect();
        Some(cells.join("\t"))
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let null = Value::Null;
    let (a, b) = (a.unwrap_or(&null), b.unwrap_or(&null));
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => plain_text(a).cmp(&plain_text(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pane() -> Pane {
        Pane::new(0, &PaneConfig::new("ds_top"))
    }

    fn rows_message(index: &str, rows: serde_json::Value) -> PushMessage {
        PushMessage::decode(&json!({"type": "rows", "index": index, "rows": rows}).to_string())
            .unwrap()
    }

    fn seq_rows(n: usize) -> serde_json::Value {
        json!((0..n).map(|i| json!({"ts": 1700000000 + i, "seq": i})).collect::<Vec<_>>())
    }

    fn seq_column(view: &PaneView) -> Vec<String> {
        view.rows.iter().map(|r| r[1].clone()).collect()
    }

    #[test]
    fn new_pane_defaults() {
        let p = pane();
        assert!(p.auto_refresh());
        assert_eq!(p.interval_ms(), 1000);
        assert!(!p.connected());
        let view = p.render();
        assert!(view.columns.is_empty());
        assert!(view.rows.is_empty());
        assert_eq!(view.connection, ConnectionState::Idle);
    }

    #[test]
    fn mount_opens_channel_and_triggers_immediately() {
        let mut p = pane();
        assert_eq!(
            p.mount(),
            vec![
                Effect::OpenChannel(0),
                Effect::StartTimer(0, Duration::from_millis(1000)),
                Effect::Trigger(0, "ds_top".into()),
            ]
        );
    }

    #[test]
    fn mount_without_auto_refresh_only_connects() {
        let mut p = Pane::new(1, &PaneConfig::new("x").auto_refresh(false));
        assert_eq!(p.mount(), vec![Effect::OpenChannel(1)]);
        assert_eq!(p.tick(), None);
    }

    #[test]
    fn toggle_off_then_on_restarts_timer_with_one_trigger() {
        let mut p = pane();
        p.mount();
        assert_eq!(p.toggle_auto_refresh(), vec![Effect::StopTimer(0)]);
        assert_eq!(p.tick(), None);
        let effects = p.toggle_auto_refresh();
        assert_eq!(
            effects,
            vec![
                Effect::StartTimer(0, Duration::from_millis(1000)),
                Effect::Trigger(0, "ds_top".into()),
            ]
        );
        assert_eq!(
            effects
                .iter()
                .filter(|e| matches!(e, Effect::Trigger(..)))
                .count(),
            1
        );
    }

    #[test]
    fn interval_is_clamped_and_restarts_timer() {
        let mut p = pane();
        p.mount();
        assert_eq!(
            p.set_interval(50),
            vec![
                Effect::StartTimer(0, Duration::from_millis(200)),
                Effect::Trigger(0, "ds_top".into()),
            ]
        );
        assert_eq!(p.interval_ms(), 200);
        assert!(p.set_interval(100).is_empty());
        p.toggle_auto_refresh();
        assert!(p.set_interval(5000).is_empty());
        assert_eq!(p.interval_ms(), 5000);
    }

    #[test]
    fn tick_triggers_while_enabled() {
        let mut p = pane();
        assert_eq!(p.tick(), None);
        p.mount();
        assert_eq!(p.tick(), Some(Effect::Trigger(0, "ds_top".into())));
    }

    #[test]
    fn dispose_stops_timer_and_closes_channel() {
        let mut p = pane();
        p.mount();
        assert_eq!(
            p.dispose(),
            vec![Effect::StopTimer(0), Effect::CloseChannel(0)]
        );
        assert_eq!(p.tick(), None);
    }

    #[test]
    fn keeps_last_rows_in_receipt_order() {
        let mut p = pane();
        assert!(p.receive_push(rows_message("ds_top", seq_rows(301))));
        let view = p.render();
        assert_eq!(view.rows.len(), 300);
        let expected: Vec<String> = (1..301).map(|i| i.to_string()).collect();
        assert_eq!(seq_column(&view), expected);
        assert_eq!(view.selected_row, 299);
        assert_eq!(view.status_message, "received 300 rows");
    }

    #[test]
    fn configured_row_cap() {
        let mut p = Pane::new(0, &PaneConfig::new("ds_top").max_rows(5_usize));
        p.receive_push(rows_message("ds_top", seq_rows(8)));
        assert_eq!(seq_column(&p.render()), vec!["3", "4", "5", "6", "7"]);
    }

    #[test]
    fn push_replaces_rows() {
        let mut p = pane();
        p.receive_push(rows_message("ds_top", seq_rows(10)));
        p.receive_push(rows_message("ds_top", seq_rows(2)));
        assert_eq!(p.row_count(), 2);
    }

    #[test]
    fn other_index_is_ignored() {
        let mut p = pane();
        p.receive_push(rows_message("ds_top", seq_rows(3)));
        let before = p.render();
        assert!(!p.receive_push(rows_message("ds_bottom", seq_rows(7))));
        assert_eq!(p.render(), before);
    }

    #[test]
    fn columns_follow_first_row_and_date_first_column() {
        let mut p = pane();
        p.receive_push(rows_message(
            "ds_top",
            json!([{"ts": 1700000000, "name": "a", "extra": null}, {"ts": 1700000000000_i64, "name": 5}]),
        ));
        let view = p.render();
        assert_eq!(view.columns, vec!["ts", "name", "extra"]);
        assert_eq!(view.rows[0][0], format_cell(&json!(1700000000), 0));
        assert_eq!(view.rows[0][0], view.rows[1][0]);
        assert_eq!(view.rows[0][2], "");
        assert_eq!(view.rows[1][1], "5");
        assert_eq!(view.rows[1][2], "");
    }

    #[test]
    fn sort_flips_and_resets_on_column_change() {
        let mut p = pane();
        p.receive_push(rows_message(
            "ds_top",
            json!([{"ts": 1, "v": "10"}, {"ts": 2, "v": 9}, {"ts": 3, "v": "100"}]),
        ));
        p.move_selection_right();
        p.sort_by_selected();
        let values = |p: &Pane| p.render().rows.iter().map(|r| r[1].clone()).collect::<Vec<_>>();
        assert_eq!(values(&p), vec!["9", "10", "100"]);
        p.sort_by_selected();
        assert_eq!(values(&p), vec!["100", "10", "9"]);
        assert_eq!(
            p.render().sort,
            Some(SortState {
                column: 1,
                ascending: false
            })
        );

        p.receive_push(rows_message("ds_top", json!([{"other": 1}])));
        assert_eq!(p.render().sort, None);
        assert_eq!(p.render().selected_column, 0);
    }

    #[test]
    fn sorted_view_survives_new_rows_with_same_columns() {
        let mut p = pane();
        p.receive_push(rows_message("ds_top", json!([{"k": "a", "v": 2}, {"k": "b", "v": 1}])));
        p.move_selection_right();
        p.sort_by_selected();
        p.receive_push(rows_message(
            "ds_top",
            json!([{"k": "c", "v": 3}, {"k": "d", "v": 1}, {"k": "e", "v": 2}]),
        ));
        let keys = |p: &Pane| p.render().rows.iter().map(|r| r[0].clone()).collect::<Vec<_>>();
        assert_eq!(keys(&p), vec!["d", "e", "c"]);
        p.reset_sort();
        assert_eq!(keys(&p), vec!["c", "d", "e"]);
        assert_eq!(p.render().selected_row, 2);
    }

    #[test]
    fn follow_tail_until_user_scrolls_up() {
        let mut p = pane();
        p.receive_push(rows_message("ds_top", seq_rows(10)));
        assert_eq!(p.render().selected_row, 9);
        p.move_selection_up(3);
        assert!(!p.render().follow);
        p.receive_push(rows_message("ds_top", seq_rows(20)));
        assert_eq!(p.render().selected_row, 6);
        p.move_selection_end();
        p.receive_push(rows_message("ds_top", seq_rows(30)));
        assert_eq!(p.render().selected_row, 29);
    }

    #[test]
    fn moving_up_on_first_row_stops_following() {
        let mut p = pane();
        p.receive_push(rows_message("ds_top", seq_rows(1)));
        assert!(p.render().follow);
        p.move_selection_up(1);
        assert!(!p.render().follow);
        p.receive_push(rows_message("ds_top", seq_rows(8)));
        assert_eq!(p.render().selected_row, 0);
    }

    #[test]
    fn clear_keeps_columns() {
        let mut p = pane();
        p.receive_push(rows_message("ds_top", seq_rows(4)));
        p.clear();
        let view = p.render();
        assert!(view.rows.is_empty());
        assert_eq!(view.columns, vec!["ts", "seq"]);
        assert_eq!(view.status_message, "table cleared");
        assert_eq!(p.selected_row_text(), None);
    }

    #[test]
    fn trigger_failures_are_status_only() {
        let mut p = pane();
        p.mount();
        p.on_trigger_completed(Err("HTTP 503 (gateway not attached)".into()));
        assert_eq!(
            p.render().status_message,
            "refresh failed: HTTP 503 (gateway not attached)"
        );
        assert!(p.tick().is_some());
        p.on_trigger_completed(Ok(()));
        assert_eq!(p.render().status_message, "refresh ok");
    }

    #[test]
    fn rebind_switches_identity_filter() {
        let mut p = pane();
        p.mount();
        p.receive_push(rows_message("ds_top", seq_rows(3)));
        assert_eq!(p.rebind("ds_other"), vec![Effect::Trigger(0, "ds_other".into())]);
        assert_eq!(p.row_count(), 0);
        assert!(!p.receive_push(rows_message("ds_top", seq_rows(3))));
        assert!(p.receive_push(rows_message("ds_other", seq_rows(3))));
        assert_eq!(p.title(), "ds_other");
    }

    #[test]
    fn empty_index_never_triggers() {
        let mut p = Pane::new(0, &PaneConfig::new(""));
        assert_eq!(p.mount(), vec![
            Effect::OpenChannel(0),
            Effect::StartTimer(0, Duration::from_millis(1000)),
        ]);
        assert!(p.refresh_now().is_empty());
        assert_eq!(p.render().status_message, "no index bound");
    }

    #[test]
    fn connection_state_transitions() {
        let mut p = pane();
        p.set_connection(ConnectionState::Connecting);
        assert!(!p.connected());
        p.set_connection(ConnectionState::Connected);
        assert!(p.connected());
        p.set_connection(ConnectionState::Disconnected);
        assert!(!p.connected());
    }

    #[test]
    fn selected_row_is_tab_separated() {
        let mut p = pane();
        p.receive_push(rows_message("ds_top", json!([{"ts": "x", "a": 1, "b": true}])));
        assert_eq!(p.selected_row_text().as_deref(), Some("x\t1\ttrue"));
    }
}
