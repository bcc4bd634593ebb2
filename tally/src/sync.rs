//! Applies incoming channel messages to the device document.
//!
//! The editor is authoritative for project configuration; the device
//! is authoritative for runtime counters. Reconciliation merges an
//! incoming config list into the local collection without ever
//! touching counters for projects that survive.

use crate::app::{App, Project};
use crate::slide::View;
use tally_ipc::{
    decode_projects, Envelope, Operation, ProjectConfig, ProjectOperation, SettingMessage,
    HARD_RESYNC, SOFT_RESYNC,
};
use tracing::{debug, error, info, warn};

/// Outcome of applying one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// The document changed; a checkpoint save is due.
    Applied,
    /// The document changed and the active project no longer exists:
    /// the caller must transition to the picker view.
    ActiveProjectRemoved,
    /// Nothing changed (control token, unknown key, or rejected
    /// payload). Errors are logged here, never surfaced.
    Ignored,
}

impl App {
    pub fn apply_message(&mut self, envelope: Envelope) -> Incoming {
        match envelope {
            Envelope::Setting(msg) => self.apply_setting(msg),
            Envelope::Operation(op) => self.apply_operation(op),
            Envelope::Control(token) => {
                match token.as_str() {
                    // Resync requests are addressed to the publisher;
                    // the device only ever emits them.
                    SOFT_RESYNC | HARD_RESYNC => debug!("ignoring publisher-bound control token"),
                    other => warn!("unknown control token: {other}"),
                }
                Incoming::Ignored
            }
        }
    }

    fn apply_setting(&mut self, msg: SettingMessage) -> Incoming {
        debug!(key = %msg.key, "received settings message");
        match msg.key.as_str() {
            "projects" => match decode_projects(&msg.value) {
                Ok(incoming) => {
                    self.reconcile_projects(&incoming);
                    if self.cur_project().is_none() {
                        Incoming::ActiveProjectRemoved
                    } else {
                        Incoming::Applied
                    }
                }
                Err(e) => {
                    error!("rejecting malformed projects payload: {e}");
                    Incoming::Ignored
                }
            },
            "timeFormat" => match serde_json::from_str(&msg.value) {
                Ok(tf) => {
                    self.time_format = tf;
                    Incoming::Applied
                }
                Err(e) => {
                    error!("rejecting malformed timeFormat payload: {e}");
                    Incoming::Ignored
                }
            },
            "isDarkMode" => match serde_json::from_str(&msg.value) {
                Ok(v) => {
                    self.is_dark_mode = v;
                    Incoming::Applied
                }
                Err(e) => {
                    error!("rejecting malformed isDarkMode payload: {e}");
                    Incoming::Ignored
                }
            },
            "projectOperation" => match serde_json::from_str::<ProjectOperation>(&msg.value) {
                Ok(op) => self.apply_operation(op),
                Err(e) => {
                    error!("rejecting malformed projectOperation payload: {e}");
                    Incoming::Ignored
                }
            },
            // Editor-side bookkeeping keys arrive during a full
            // republish; they mean nothing here.
            "nextId" | "settingsState" | "needsSync" => {
                debug!(key = %msg.key, "ignoring editor-side key");
                Incoming::Ignored
            }
            other => {
                warn!("ignoring unknown settings key: {other}");
                Incoming::Ignored
            }
        }
    }

    fn apply_operation(&mut self, op: ProjectOperation) -> Incoming {
        match op.operation {
            Operation::ResetCounters => {
                let value = op.reset_value();
                match self.project_mut(op.proj_id) {
                    Some(project) => {
                        info!("resetting counters for project {} to {value}", op.proj_id);
                        project.global_count = value;
                        project.repeat_count = value;
                        Incoming::Applied
                    }
                    // The project raced a deletion; the operation is
                    // stale and dropped without noise.
                    None => Incoming::Ignored,
                }
            }
        }
    }

    /// Merges an authoritative config list into the local collection.
    ///
    /// Removal swaps each stale slot with the last live slot and
    /// truncates once, rather than filtering in place. Survivor order
    /// after a deletion batch is therefore not generally stable; the
    /// editor relies on this staying O(n), and the resulting order is
    /// pinned by tests below. (Whether stable order was ever wanted is
    /// unclear; the swap behaviour is the compatible one.)
    pub fn reconcile_projects(&mut self, incoming: &[(u32, ProjectConfig)]) {
        // Walked back to front, so a batch of new ids lands appended in
        // reverse incoming order.
        for (id, cfg) in incoming.iter().rev() {
            match self.project_mut(*id) {
                Some(project) => project.apply_config(cfg),
                None => self.projects.push((*id, Project::from_config(cfg))),
            }
        }

        let mut removed = 0;
        for i in (0..self.projects.len()).rev() {
            let id = self.projects[i].0;
            if !incoming.iter().any(|(incoming_id, _)| *incoming_id == id) {
                warn!("removing project {id} absent from incoming list");
                let last = self.projects.len() - 1 - removed;
                self.projects.swap(i, last);
                removed += 1;
            }
        }
        self.projects.truncate(self.projects.len() - removed);

        if self.picker_selected >= self.projects.len() {
            self.picker_selected = self.projects.len().saturating_sub(1);
        }
        info!("reconciled {} projects", self.projects.len());
    }
}

/// Convenience for the run loop: applies a drained batch and reports
/// whether any message changed the document and whether the active
/// project was lost along the way.
pub struct BatchOutcome {
    pub changed: bool,
    pub active_removed: bool,
}

pub fn apply_batch(app: &mut App, batch: Vec<Envelope>) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        changed: false,
        active_removed: false,
    };
    for envelope in batch {
        match app.apply_message(envelope) {
            Incoming::Applied => outcome.changed = true,
            Incoming::ActiveProjectRemoved => {
                outcome.changed = true;
                outcome.active_removed = true;
            }
            Incoming::Ignored => {}
        }
    }
    if outcome.active_removed {
        app.view = View::Picker;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Bubble;
    use crate::config::Config;
    use tally_ipc::{encode_projects, TimeFormat};

    fn app_with(ids: &[u32]) -> App {
        let mut app = App::new(Config::default());
        app.projects.clear();
        for id in ids {
            app.projects.push((
                *id,
                Project::from_config(&ProjectConfig::new(*id, format!("p{id}"))),
            ));
        }
        app.proj_id = ids.first().copied().unwrap_or(0);
        app
    }

    fn configs(ids: &[u32]) -> Vec<(u32, ProjectConfig)> {
        ids.iter()
            .map(|id| (*id, ProjectConfig::new(*id, format!("p{id}"))))
            .collect()
    }

    #[test]
    fn reconciliation_preserves_counters() {
        let mut app = app_with(&[0, 1]);
        {
            let p = app.project_mut(1).unwrap();
            p.global_count = 12;
            p.repeat_count = 7;
            p.selected_bubble = Bubble::RepeatCount;
        }
        let mut incoming = configs(&[0, 1]);
        incoming[1].1.name = "renamed".to_string();
        incoming[1].1.repeat_length = 3;
        app.reconcile_projects(&incoming);

        let p = app.project(1).unwrap();
        assert_eq!(p.global_count, 12);
        assert_eq!(p.repeat_count, 7);
        assert_eq!(p.selected_bubble, Bubble::RepeatCount);
        assert_eq!(p.name, "renamed");
        assert_eq!(p.repeat_length, 3);
    }

    #[test]
    fn reconciliation_creates_new_with_fresh_state() {
        let mut app = app_with(&[0]);
        app.reconcile_projects(&configs(&[0, 5]));
        let p = app.project(5).unwrap();
        assert_eq!(p.global_count, 0);
        assert_eq!(p.repeat_count, 0);
        assert_eq!(p.selected_bubble, Bubble::Global);
    }

    #[test]
    fn reconciliation_removes_stale_ids_exactly() {
        let mut app = app_with(&[0, 1, 2, 3]);
        app.reconcile_projects(&configs(&[1, 3]));
        let mut ids: Vec<u32> = app.projects.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let mut app = app_with(&[0, 1, 2]);
        let incoming = configs(&[1, 2, 9]);
        app.reconcile_projects(&incoming);
        let once: Vec<(u32, Project)> = app.projects.clone();
        app.reconcile_projects(&incoming);
        assert_eq!(app.projects, once);
    }

    #[test]
    fn new_projects_append_in_reverse_incoming_order() {
        let mut app = app_with(&[0]);
        app.reconcile_projects(&configs(&[0, 5, 6]));
        let ids: Vec<u32> = app.projects.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 6, 5]);
    }

    #[test]
    fn swap_removal_order_is_pinned() {
        // Removing the head swaps the tail into its slot: [0,1,2] minus
        // id 0 yields [2,1], not the stable [1,2].
        let mut app = app_with(&[0, 1, 2]);
        app.reconcile_projects(&configs(&[1, 2]));
        let ids: Vec<u32> = app.projects.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn malformed_projects_batch_is_rejected_whole() {
        let mut app = app_with(&[0, 1]);
        let before = app.projects.clone();
        let outcome = app.apply_message(Envelope::setting("projects", "[[0,{\"broken\""));
        assert_eq!(outcome, Incoming::Ignored);
        assert_eq!(app.projects, before);
    }

    #[test]
    fn reset_operation_applies_data_or_zero() {
        let mut app = app_with(&[0]);
        app.project_mut(0).unwrap().global_count = 9;
        app.project_mut(0).unwrap().repeat_count = 4;

        let outcome = app.apply_message(Envelope::Operation(ProjectOperation::reset(0)));
        assert_eq!(outcome, Incoming::Applied);
        assert_eq!(app.project(0).unwrap().global_count, 0);

        let op = ProjectOperation {
            data: Some(5),
            ..ProjectOperation::reset(0)
        };
        app.apply_message(Envelope::Operation(op));
        assert_eq!(app.project(0).unwrap().global_count, 5);
        assert_eq!(app.project(0).unwrap().repeat_count, 5);
    }

    #[test]
    fn reset_for_unknown_project_is_dropped_silently() {
        let mut app = app_with(&[0]);
        let outcome = app.apply_message(Envelope::Operation(ProjectOperation::reset(42)));
        assert_eq!(outcome, Incoming::Ignored);
    }

    #[test]
    fn reset_tunnelled_through_settings_key_is_applied() {
        let mut app = app_with(&[0]);
        app.project_mut(0).unwrap().global_count = 3;
        let value = serde_json::to_string(&ProjectOperation::reset(0)).unwrap();
        let outcome = app.apply_message(Envelope::setting("projectOperation", value));
        assert_eq!(outcome, Incoming::Applied);
        assert_eq!(app.project(0).unwrap().global_count, 0);
    }

    #[test]
    fn losing_the_active_project_forces_the_picker() {
        let mut app = app_with(&[0, 1]);
        app.proj_id = 0;
        let incoming = encode_projects(&configs(&[1])).unwrap();
        let outcome = apply_batch(&mut app, vec![Envelope::setting("projects", incoming)]);
        assert!(outcome.changed);
        assert!(outcome.active_removed);
        assert_eq!(app.view, View::Picker);
        // Surviving counters are untouched by the delete.
        assert!(app.project(1).is_some());
    }

    #[test]
    fn full_snapshot_converges_device_to_editor_state() {
        // A stale device: one project that still exists remotely (with
        // live counters), one that was deleted remotely.
        let mut app = app_with(&[1, 2]);
        app.proj_id = 1;
        app.project_mut(1).unwrap().global_count = 7;
        app.project_mut(1).unwrap().repeat_count = 7;

        let mut remote = configs(&[0, 1]);
        remote[1].1.repeat_length = 5;
        let snapshot = vec![
            Envelope::setting("projects", encode_projects(&remote).unwrap()),
            Envelope::setting("nextId", "2"),
            Envelope::setting(
                "timeFormat",
                serde_json::to_string(&TimeFormat {
                    show_time: true,
                    show_seconds: true,
                    is_24hour_time: true,
                })
                .unwrap(),
            ),
            Envelope::setting("isDarkMode", "false"),
            Envelope::setting("needsSync", ""),
        ];
        let outcome = apply_batch(&mut app, snapshot);
        assert!(outcome.changed);
        assert!(!outcome.active_removed);

        // Config fields now equal the editor's for every id.
        let ids: Vec<u32> = {
            let mut ids: Vec<u32> = app.projects.iter().map(|(id, _)| *id).collect();
            ids.sort_unstable();
            ids
        };
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(app.project(1).unwrap().repeat_length, 5);
        // Counters survive for ids that already existed.
        assert_eq!(app.project(1).unwrap().global_count, 7);
        assert_eq!(app.project(1).unwrap().repeat_count, 7);
        assert_eq!(app.project(0).unwrap().global_count, 0);
        assert!(app.time_format.show_seconds);
        assert!(!app.is_dark_mode);
    }

    #[test]
    fn resync_tokens_do_not_change_state() {
        let mut app = app_with(&[0]);
        let before = app.projects.clone();
        assert_eq!(app.apply_message(Envelope::soft_resync()), Incoming::Ignored);
        assert_eq!(app.apply_message(Envelope::hard_resync()), Incoming::Ignored);
        assert_eq!(app.projects, before);
    }
}
