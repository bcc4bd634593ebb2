//! The settings editor's page state machine.
//!
//! Exactly one page is active at a time; transitions replace the state
//! wholesale. Add/Edit operate on a staged copy of one project's
//! config, and the live projects map is mutated only by `save` and
//! `confirm`, which makes every flow atomic and cancel-safe.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_ipc::{
    ProjectConfig, ProjectOperation, TimeFormat, DEFAULT_IS_DARK_MODE, INIT_PROJ_ID,
    INIT_PROJ_NAME, PALETTE,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "page")]
pub enum SettingsState {
    #[default]
    Main,
    Add {
        staged: ProjectConfig,
    },
    Edit {
        staged: ProjectConfig,
    },
    Delete {
        #[serde(rename = "projId")]
        proj_id: u32,
    },
    Reset {
        #[serde(rename = "projId")]
        proj_id: u32,
    },
}

/// The editor-side document. The device never sees the staged state
/// or `next_id`; it only ever receives the committed projects map.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsDoc {
    pub next_id: u32,
    pub projects: BTreeMap<u32, ProjectConfig>,
    pub state: SettingsState,
    pub time_format: TimeFormat,
    pub is_dark_mode: bool,
}

impl Default for SettingsDoc {
    fn default() -> Self {
        let mut projects = BTreeMap::new();
        projects.insert(INIT_PROJ_ID, ProjectConfig::new(INIT_PROJ_ID, INIT_PROJ_NAME));
        Self {
            next_id: INIT_PROJ_ID + 1,
            projects,
            state: SettingsState::Main,
            time_format: TimeFormat::default(),
            is_dark_mode: DEFAULT_IS_DARK_MODE,
        }
    }
}

impl SettingsDoc {
    /// Main -> Edit, staging a copy of the selected project.
    pub fn begin_edit(&mut self, id: u32) -> Result<()> {
        if self.state != SettingsState::Main {
            bail!("already editing; save or cancel first");
        }
        let Some(config) = self.projects.get(&id) else {
            bail!("no project with id {id}");
        };
        self.state = SettingsState::Edit {
            staged: config.clone(),
        };
        Ok(())
    }

    /// Main -> Add. Allocates the new id up front; a cancelled add
    /// burns the id, since ids are never reused.
    pub fn begin_add(&mut self) -> Result<()> {
        if self.state != SettingsState::Main {
            bail!("already editing; save or cancel first");
        }
        let id = self.next_id;
        self.next_id += 1;
        let name = format!("Project {}", self.projects.len() + 1);
        self.state = SettingsState::Add {
            staged: ProjectConfig::new(id, name),
        };
        Ok(())
    }

    fn staged_mut(&mut self) -> Result<&mut ProjectConfig> {
        match &mut self.state {
            SettingsState::Add { staged } | SettingsState::Edit { staged } => Ok(staged),
            _ => bail!("no project is being edited"),
        }
    }

    /// Field edit; empty names are rejected outright rather than
    /// stored and validated later.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            bail!("project name cannot be empty");
        }
        self.staged_mut()?.name = name.to_string();
        Ok(())
    }

    pub fn set_colour(&mut self, colour: &str) -> Result<()> {
        if !PALETTE.contains(&colour) {
            bail!("unknown colour '{colour}' (expected one of: {})", PALETTE.join(", "));
        }
        self.staged_mut()?.colour = colour.to_string();
        Ok(())
    }

    pub fn set_repeat_length(&mut self, length: u32) -> Result<()> {
        self.staged_mut()?.repeat_length = length;
        Ok(())
    }

    pub fn set_repeat_goal(&mut self, goal: Option<u32>) -> Result<()> {
        self.staged_mut()?.repeat_goal = goal;
        Ok(())
    }

    /// Add/Edit -> Main, committing the staged config at its id.
    pub fn save(&mut self) -> Result<()> {
        let staged = match std::mem::take(&mut self.state) {
            SettingsState::Add { staged } | SettingsState::Edit { staged } => staged,
            other => {
                self.state = other;
                bail!("nothing to save");
            }
        };
        self.projects.insert(staged.id, staged);
        self.state = SettingsState::Main;
        Ok(())
    }

    /// Any editing page -> Main, discarding staged state. The live
    /// projects map is untouched.
    pub fn cancel(&mut self) -> Result<()> {
        if self.state == SettingsState::Main {
            bail!("nothing to cancel");
        }
        self.state = SettingsState::Main;
        Ok(())
    }

    /// Edit -> Delete confirmation.
    pub fn request_delete(&mut self) -> Result<()> {
        let SettingsState::Edit { staged } = &self.state else {
            bail!("open a project for editing first");
        };
        self.state = SettingsState::Delete { proj_id: staged.id };
        Ok(())
    }

    /// Edit -> Reset confirmation.
    pub fn request_reset(&mut self) -> Result<()> {
        let SettingsState::Edit { staged } = &self.state else {
            bail!("open a project for editing first");
        };
        self.state = SettingsState::Reset { proj_id: staged.id };
        Ok(())
    }

    /// Delete/Reset -> Main. Deleting mutates the map here; resetting
    /// mutates nothing locally and instead yields the operation to be
    /// sent to the device, which owns the counters.
    pub fn confirm(&mut self) -> Result<Option<ProjectOperation>> {
        match self.state.clone() {
            SettingsState::Delete { proj_id } => {
                if self.projects.remove(&proj_id).is_none() {
                    tracing::warn!("delete of unknown project {proj_id} is a no-op");
                }
                self.state = SettingsState::Main;
                Ok(None)
            }
            SettingsState::Reset { proj_id } => {
                self.state = SettingsState::Main;
                Ok(Some(ProjectOperation::reset(proj_id)))
            }
            _ => bail!("nothing to confirm"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_flow_commits_with_a_fresh_id() {
        // The concrete scenario: {0: A/10}, nextId 1; add B/5; save.
        let mut doc = SettingsDoc::default();
        doc.projects.get_mut(&0).unwrap().name = "A".to_string();
        assert_eq!(doc.next_id, 1);

        doc.begin_add().unwrap();
        assert_eq!(doc.next_id, 2);
        doc.set_name("B").unwrap();
        doc.set_repeat_length(5).unwrap();
        doc.save().unwrap();

        assert_eq!(doc.state, SettingsState::Main);
        assert_eq!(doc.projects.len(), 2);
        let b = &doc.projects[&1];
        assert_eq!(b.name, "B");
        assert_eq!(b.repeat_length, 5);
    }

    #[test]
    fn add_gets_a_default_numbered_name() {
        let mut doc = SettingsDoc::default();
        doc.begin_add().unwrap();
        match &doc.state {
            SettingsState::Add { staged } => assert_eq!(staged.name, "Project 2"),
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn cancel_leaves_the_committed_project_untouched() {
        let mut doc = SettingsDoc::default();
        let before = doc.projects[&0].clone();

        doc.begin_edit(0).unwrap();
        doc.set_name("scribbles").unwrap();
        doc.set_repeat_length(99).unwrap();
        doc.set_repeat_goal(Some(4)).unwrap();
        doc.cancel().unwrap();

        assert_eq!(doc.state, SettingsState::Main);
        assert_eq!(doc.projects[&0], before);
    }

    #[test]
    fn cancelled_add_burns_the_id() {
        let mut doc = SettingsDoc::default();
        doc.begin_add().unwrap();
        doc.cancel().unwrap();
        assert_eq!(doc.projects.len(), 1);
        assert_eq!(doc.next_id, 2);
    }

    #[test]
    fn empty_name_is_rejected_without_a_transition() {
        let mut doc = SettingsDoc::default();
        doc.begin_edit(0).unwrap();
        assert!(doc.set_name("").is_err());
        match &doc.state {
            SettingsState::Edit { staged } => assert_eq!(staged.name, INIT_PROJ_NAME),
            other => panic!("expected Edit, got {other:?}"),
        }
    }

    #[test]
    fn unknown_colour_is_rejected() {
        let mut doc = SettingsDoc::default();
        doc.begin_edit(0).unwrap();
        assert!(doc.set_colour("taupe").is_err());
        assert!(doc.set_colour("green").is_ok());
    }

    #[test]
    fn delete_flow_removes_on_confirm_only() {
        let mut doc = SettingsDoc::default();
        doc.begin_edit(0).unwrap();
        doc.request_delete().unwrap();
        assert_eq!(doc.state, SettingsState::Delete { proj_id: 0 });
        assert!(doc.projects.contains_key(&0));

        let op = doc.confirm().unwrap();
        assert!(op.is_none());
        assert!(doc.projects.is_empty());
        assert_eq!(doc.state, SettingsState::Main);
    }

    #[test]
    fn delete_can_be_cancelled() {
        let mut doc = SettingsDoc::default();
        doc.begin_edit(0).unwrap();
        doc.request_delete().unwrap();
        doc.cancel().unwrap();
        assert_eq!(doc.state, SettingsState::Main);
        assert!(doc.projects.contains_key(&0));
    }

    #[test]
    fn reset_confirm_emits_an_operation_and_mutates_nothing() {
        let mut doc = SettingsDoc::default();
        let before = doc.projects.clone();
        doc.begin_edit(0).unwrap();
        doc.request_reset().unwrap();

        let op = doc.confirm().unwrap().expect("reset emits an operation");
        assert_eq!(op.proj_id, 0);
        assert_eq!(op.reset_value(), 0);
        assert_eq!(doc.projects, before);
        assert_eq!(doc.state, SettingsState::Main);
    }

    #[test]
    fn events_from_the_wrong_page_are_errors() {
        let mut doc = SettingsDoc::default();
        assert!(doc.set_name("x").is_err());
        assert!(doc.save().is_err());
        assert!(doc.cancel().is_err());
        assert!(doc.confirm().is_err());
        assert!(doc.request_delete().is_err());

        doc.begin_edit(0).unwrap();
        assert!(doc.begin_add().is_err());
        assert!(doc.begin_edit(0).is_err());
    }

    #[test]
    fn settings_state_round_trips_as_a_tagged_record() {
        let state = SettingsState::Edit {
            staged: ProjectConfig::new(3, "C"),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"page\":\"Edit\""));
        let back: SettingsState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
