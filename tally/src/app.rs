use crate::config::Config;
use crate::slide::{SlideController, View};
use serde::{Deserialize, Serialize};
use tachyonfx::{fx, EffectManager};
use tally_ipc::{
    ProjectConfig, TimeFormat, DEFAULT_COLOUR, DEFAULT_IS_DARK_MODE, INIT_PROJ_ID, INIT_PROJ_NAME,
    INIT_REPEAT_LEN,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bubble {
    #[default]
    Global,
    RepeatProgress,
    RepeatCount,
}

/// One tracked activity as the device holds it: the synced config
/// fields plus the device-owned runtime counters. Counters survive
/// config edits and are only ever zeroed by an explicit reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub repeat_length: u32,
    pub repeat_goal: Option<u32>,
    pub colour: String,
    pub global_count: u32,
    pub repeat_count: u32,
    pub selected_bubble: Bubble,
}

impl Project {
    pub fn from_config(cfg: &ProjectConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            repeat_length: cfg.repeat_length,
            repeat_goal: cfg.repeat_goal,
            colour: cfg.colour.clone(),
            global_count: 0,
            repeat_count: 0,
            selected_bubble: Bubble::Global,
        }
    }

    /// Updates the config fields in place, leaving the counters and
    /// bubble selection untouched.
    pub fn apply_config(&mut self, cfg: &ProjectConfig) {
        self.name = cfg.name.clone();
        self.repeat_length = cfg.repeat_length;
        self.repeat_goal = cfg.repeat_goal;
        self.colour = cfg.colour.clone();
    }

    /// Progress within the current repeat.
    pub fn repeat_pos(&self) -> u32 {
        if self.repeat_length == 0 {
            0
        } else {
            self.repeat_count % self.repeat_length
        }
    }

    /// Number of full repeats completed.
    pub fn num_repeats(&self) -> u32 {
        if self.repeat_length == 0 {
            0
        } else {
            self.repeat_count / self.repeat_length
        }
    }

    /// Applies a +/- press to whichever bubble is selected. Returns
    /// true when the press completes the repeat goal exactly.
    pub fn increment(&mut self, delta: i32) -> bool {
        match self.selected_bubble {
            Bubble::Global => {
                self.global_count = add_clamped(self.global_count, delta as i64);
                self.bump_repeat(delta as i64)
            }
            Bubble::RepeatProgress => self.bump_repeat(delta as i64),
            // Widened before multiplying: the full u32 repeat-length
            // range must not flip the sign.
            Bubble::RepeatCount => self.bump_repeat(delta as i64 * self.repeat_length as i64),
        }
    }

    fn bump_repeat(&mut self, delta: i64) -> bool {
        if self.repeat_length == 0 {
            self.repeat_count = 0;
            return false;
        }
        self.repeat_count = add_clamped(self.repeat_count, delta);
        match self.repeat_goal {
            Some(goal) if goal > 0 && delta > 0 => {
                self.repeat_pos() == 0 && self.num_repeats() == goal
            }
            _ => false,
        }
    }
}

fn add_clamped(value: u32, delta: i64) -> u32 {
    (value as i64 + delta).clamp(0, u32::MAX as i64) as u32
}

/// Device state. The serializable fields are the persisted device
/// document; everything else is per-run UI state.
#[derive(Serialize, Deserialize)]
pub struct App {
    pub proj_id: u32,
    // Ordered list of id/project pairs: iteration order is display
    // order, lookup is linear by id.
    pub projects: Vec<(u32, Project)>,
    pub time_format: TimeFormat,
    pub is_dark_mode: bool,
    #[serde(skip)]
    pub view: View,
    #[serde(skip)]
    pub slide: SlideController,
    #[serde(skip)]
    pub picker_selected: usize,
    #[serde(skip)]
    pub channel_open: bool,
    #[serde(skip)]
    pub config: Config,
    #[serde(skip, default = "default_effect_manager")]
    pub effect_manager: EffectManager<u32>,
    #[serde(skip)]
    pub should_quit: bool,
}

pub fn default_effect_manager() -> EffectManager<u32> {
    EffectManager::default()
}

impl App {
    pub fn new(config: Config) -> Self {
        let seed = ProjectConfig {
            id: INIT_PROJ_ID,
            name: INIT_PROJ_NAME.to_string(),
            repeat_length: INIT_REPEAT_LEN,
            repeat_goal: None,
            colour: DEFAULT_COLOUR.to_string(),
        };
        Self {
            proj_id: INIT_PROJ_ID,
            projects: vec![(INIT_PROJ_ID, Project::from_config(&seed))],
            time_format: TimeFormat::default(),
            is_dark_mode: DEFAULT_IS_DARK_MODE,
            view: View::Project,
            slide: SlideController::default(),
            picker_selected: 0,
            channel_open: false,
            config,
            effect_manager: EffectManager::default(),
            should_quit: false,
        }
    }

    pub fn project(&self, id: u32) -> Option<&Project> {
        self.projects.iter().find(|(i, _)| *i == id).map(|(_, p)| p)
    }

    pub fn project_mut(&mut self, id: u32) -> Option<&mut Project> {
        self.projects
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, p)| p)
    }

    pub fn cur_project(&self) -> Option<&Project> {
        self.project(self.proj_id)
    }

    pub fn cur_project_mut(&mut self) -> Option<&mut Project> {
        let id = self.proj_id;
        self.project_mut(id)
    }

    /// Called once after load: if the persisted active project no
    /// longer exists, rest on the picker instead.
    pub fn ensure_active_project(&mut self) {
        if self.cur_project().is_none() {
            self.view = View::Picker;
            self.slide.rest(View::Picker);
        }
    }

    /// Returns true when the press completed the repeat goal.
    pub fn increment(&mut self, delta: i32) -> bool {
        match self.cur_project_mut() {
            Some(project) => project.increment(delta),
            None => false,
        }
    }

    pub fn select_bubble(&mut self, bubble: Bubble) {
        if let Some(project) = self.cur_project_mut() {
            project.selected_bubble = bubble;
        }
    }

    pub fn cycle_bubble(&mut self) {
        if let Some(project) = self.cur_project_mut() {
            project.selected_bubble = match project.selected_bubble {
                Bubble::Global => Bubble::RepeatProgress,
                Bubble::RepeatProgress => Bubble::RepeatCount,
                Bubble::RepeatCount => Bubble::Global,
            };
        }
    }

    pub fn picker_up(&mut self) {
        self.picker_selected = self.picker_selected.saturating_sub(1);
    }

    pub fn picker_down(&mut self) {
        if !self.projects.is_empty() {
            self.picker_selected = (self.picker_selected + 1).min(self.projects.len() - 1);
        }
    }

    /// Picker tap: switch the active project and jump straight back to
    /// the project view, no slide animation.
    pub fn select_picker_entry(&mut self) {
        if let Some((id, _)) = self.projects.get(self.picker_selected) {
            self.proj_id = *id;
            self.view = View::Project;
            self.slide.rest(View::Project);
        }
    }

    pub fn trigger_select_effect(&mut self, area: ratatui::layout::Rect) {
        let effect = fx::dissolve(250).with_area(area);
        self.effect_manager.add_effect(effect);
    }

    pub fn trigger_goal_effect(&mut self, area: ratatui::layout::Rect) {
        let effect = fx::fade_to_fg(self.config.theme.green, 500).with_area(area);
        self.effect_manager.add_effect(effect);
    }

    pub fn notify_goal_reached(&self) {
        let name = self
            .cur_project()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        if let Err(e) = notify_rust::Notification::new()
            .summary(&name)
            .body("Repeat goal reached!")
            .appname("tally")
            .show()
        {
            tracing::warn!("failed to send notification: {e}");
        }
    }
}
