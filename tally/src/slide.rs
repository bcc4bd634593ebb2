//! Horizontal slide between the active-project view and the picker.
//!
//! While a pointer is down the offset tracks displacement, clamped to
//! [-width, 0]. On release the controller either commits to the picker
//! (past 40% of the width) or springs back. The transition is a
//! discrete-time exponential approach with the per-millisecond speed
//! floored at 1 offset-unit, so it converges instead of stalling as
//! the remaining distance shrinks.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum View {
    #[default]
    Project,
    Picker,
}

#[derive(Debug, Clone, Copy)]
struct Anim {
    target: f32,
    dist: f32,
    sign: f32,
    last_ms: u64,
}

#[derive(Debug, Default)]
pub struct SlideController {
    width: f32,
    offset: f32,
    drag_origin: Option<f32>,
    anim: Option<Anim>,
}

const COMMIT_FRACTION: f32 = 0.4;

impl SlideController {
    /// Current horizontal offset of the project view, in [-width, 0].
    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn is_idle(&self) -> bool {
        self.anim.is_none() && self.drag_origin.is_none()
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = width.max(0.0);
        self.offset = self.clamp(self.offset);
    }

    /// Parks the offset at the resting position for a view. Used after
    /// instant (non-animated) view changes and on resize while idle.
    pub fn rest(&mut self, view: View) {
        self.anim = None;
        self.drag_origin = None;
        self.offset = self.target_for(view);
    }

    pub fn drag_start(&mut self, x: f32) {
        self.anim = None;
        self.drag_origin = Some(x);
    }

    pub fn drag_move(&mut self, x: f32) {
        if let Some(origin) = self.drag_origin {
            let moved = (x - origin).min(0.0);
            self.offset = self.clamp(moved);
        }
    }

    /// Ends the drag and starts the commit/spring-back animation.
    /// Returns the view the release committed to.
    pub fn drag_end(&mut self, x: f32, now_ms: u64) -> Option<View> {
        let origin = self.drag_origin.take()?;
        let moved = x - origin;
        let view = if moved < -COMMIT_FRACTION * self.width {
            View::Picker
        } else {
            View::Project
        };
        self.animate(view, now_ms);
        Some(view)
    }

    pub fn animate(&mut self, view: View, now_ms: u64) {
        let target = self.target_for(view);
        let current = self.offset;
        self.drag_origin = None;
        self.anim = Some(Anim {
            target,
            dist: current - target,
            sign: if target >= current { 1.0 } else { -1.0 },
            last_ms: now_ms,
        });
    }

    /// Advances the animation to `now_ms`. Returns true while still
    /// animating. Speed is `sign * max(1, |dist| / 100)` per elapsed
    /// millisecond, so the final approach never underflows to a stall.
    pub fn step(&mut self, now_ms: u64) -> bool {
        let Some(mut anim) = self.anim else {
            return false;
        };
        if anim.dist * anim.sign >= 0.0 {
            self.offset = self.clamp(anim.target);
            self.anim = None;
            return false;
        }
        let elapsed = now_ms.saturating_sub(anim.last_ms) as f32;
        anim.last_ms = now_ms;
        let velocity = anim.sign * (anim.dist.abs() / 100.0).max(1.0);
        anim.dist += velocity * elapsed;
        if anim.dist * anim.sign >= 0.0 {
            self.offset = self.clamp(anim.target);
            self.anim = None;
            false
        } else {
            self.offset = self.clamp(anim.target + anim.dist);
            self.anim = Some(anim);
            true
        }
    }

    fn target_for(&self, view: View) -> f32 {
        match view {
            View::Project => 0.0,
            View::Picker => -self.width,
        }
    }

    fn clamp(&self, offset: f32) -> f32 {
        offset.max(-self.width).min(0.0)
    }
}
