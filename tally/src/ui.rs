use crate::app::{App, Bubble};
use crate::config::accent;
use crate::slide::View;
use chrono::NaiveTime;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Gauge, List, ListItem, Paragraph},
    Frame,
};
use tachyonfx::{Duration as TachyonDuration, EffectRenderer};
use tally_ipc::TimeFormat;

#[derive(Default, Clone)]
pub struct UiLayout {
    pub bubbles: Vec<Rect>,
    pub status_bar: Rect,
}

impl EffectRenderer<u32> for UiLayout {
    fn render_effect(&mut self, _key: &mut u32, _area: Rect, _delta: TachyonDuration) {}
}

pub fn draw(f: &mut Frame, app: &mut App, elapsed: std::time::Duration) -> UiLayout {
    let area = f.area();
    app.slide.set_width(area.width as f32);
    if app.slide.is_idle() {
        app.slide.rest(app.view);
    }

    let theme = app.config.theme.clone();
    let (bg, fg) = if app.is_dark_mode {
        (theme.background, theme.foreground)
    } else {
        (theme.foreground, theme.background)
    };
    f.render_widget(Block::default().style(Style::default().bg(bg).fg(fg)), area);

    // The slide offset partitions the frame: the project view shrinks
    // leftwards while the picker enters from the right.
    let project_width = (area.width as f32 + app.slide.offset())
        .round()
        .clamp(0.0, area.width as f32) as u16;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(project_width), Constraint::Min(0)])
        .split(area);

    let mut layout = UiLayout::default();
    if chunks[0].width > 0 {
        layout = draw_project_view(f, chunks[0], app);
    }
    if chunks[1].width > 0 {
        draw_picker(f, chunks[1], app);
    }

    app.effect_manager.process_effects(
        TachyonDuration::from_millis(elapsed.as_millis() as u32),
        f.buffer_mut(),
        area,
    );
    layout
}

fn draw_project_view(f: &mut Frame, area: Rect, app: &App) -> UiLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(7),
            Constraint::Length(3),
        ])
        .split(area);

    draw_header(f, chunks[0], app);
    let bubbles = match app.cur_project() {
        Some(_) => draw_bubbles(f, chunks[1], app),
        None => {
            f.render_widget(
                Paragraph::new("No active project. Pick one from the list.")
                    .style(Style::default().fg(app.config.theme.gray))
                    .alignment(Alignment::Center),
                chunks[1],
            );
            vec![]
        }
    };
    draw_status_bar(f, chunks[2], app);

    UiLayout {
        bubbles,
        status_bar: chunks[2],
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let name = app
        .cur_project()
        .map(|p| p.name.clone())
        .unwrap_or_else(|| "tally".to_string());
    let colour = app
        .cur_project()
        .map(|p| accent(theme, &p.colour))
        .unwrap_or(theme.blue);

    let mut spans = vec![
        Span::raw(icons.header_left.clone()),
        Span::styled(name, Style::default().fg(colour).add_modifier(Modifier::BOLD)),
        Span::raw(icons.header_right.clone()),
    ];
    if let Some(time) = clock_line(chrono::Local::now().time(), &app.time_format) {
        spans.push(Span::raw(format!(" {} ", icons.separator)));
        spans.push(Span::styled(time, Style::default().fg(theme.gray)));
    }
    f.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_bubbles(f: &mut Frame, area: Rect, app: &App) -> Vec<Rect> {
    let project = match app.cur_project() {
        Some(p) => p,
        None => return vec![],
    };
    let theme = &app.config.theme;
    let colour = accent(theme, &project.colour);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(area);

    let sub_counting = project.repeat_length > 0;
    let repeat_ratio = if sub_counting {
        project.repeat_pos() as f64 / project.repeat_length as f64
    } else {
        0.0
    };
    let goal_ratio = match project.repeat_goal {
        Some(goal) if goal > 0 && sub_counting => {
            (project.num_repeats() as f64 / goal as f64).min(1.0)
        }
        _ => 0.0,
    };

    draw_bubble(
        f,
        chunks[0],
        app,
        Bubble::Global,
        " Count ",
        project.global_count.to_string(),
        None,
        colour,
    );
    draw_bubble(
        f,
        chunks[1],
        app,
        Bubble::RepeatProgress,
        " Repeat ",
        if sub_counting {
            format!("{} / {}", project.repeat_pos(), project.repeat_length)
        } else {
            "—".to_string()
        },
        sub_counting.then_some(repeat_ratio),
        colour,
    );
    draw_bubble(
        f,
        chunks[2],
        app,
        Bubble::RepeatCount,
        " Repeats ",
        if sub_counting {
            match project.repeat_goal {
                Some(goal) => format!("{} / {}", project.num_repeats(), goal),
                None => project.num_repeats().to_string(),
            }
        } else {
            "—".to_string()
        },
        project.repeat_goal.map(|_| goal_ratio),
        colour,
    );

    chunks.to_vec()
}

#[allow(clippy::too_many_arguments)]
fn draw_bubble(
    f: &mut Frame,
    area: Rect,
    app: &App,
    bubble: Bubble,
    title: &str,
    value: String,
    gauge: Option<f64>,
    colour: ratatui::style::Color,
) {
    let theme = &app.config.theme;
    let selected = app
        .cur_project()
        .map(|p| p.selected_bubble == bubble)
        .unwrap_or(false);
    let border = if selected { theme.selection } else { theme.black };

    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(if selected {
            BorderType::Double
        } else {
            BorderType::Rounded
        })
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);
    f.render_widget(
        Paragraph::new(value)
            .style(Style::default().fg(colour).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        rows[0],
    );
    if let Some(ratio) = gauge {
        f.render_widget(
            Gauge::default()
                .gauge_style(Style::default().fg(colour).bg(theme.black))
                .percent((ratio.clamp(0.0, 1.0) * 100.0) as u16),
            rows[1],
        );
    }
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (mode_text, mode_color) = match app.view {
        View::Project => ("PROJECT", theme.green),
        View::Picker => ("PICKER", theme.magenta),
    };
    let link = if app.channel_open { "●" } else { "○" };
    let help = match app.view {
        View::Project => "+/-:count │ b:bubble │ h:projects │ q:quit",
        View::Picker => "j/k:move │ enter:select │ l:back │ q:quit",
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" {} ", mode_text),
                Style::default()
                    .bg(mode_color)
                    .fg(theme.background)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::raw(help),
            Span::raw(" "),
            Span::styled(link, Style::default().fg(theme.gray)),
        ]))
        .block(Block::default().style(Style::default().bg(theme.black).fg(theme.gray))),
        area,
    );
}

fn draw_picker(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let block = Block::default()
        .title(Span::styled(" Projects ", Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.green));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if app.projects.is_empty() {
        f.render_widget(
            Paragraph::new("No projects. Add one from the settings app.")
                .style(Style::default().fg(theme.gray))
                .alignment(Alignment::Center),
            inner,
        );
        return;
    }

    let items: Vec<ListItem> = app
        .projects
        .iter()
        .enumerate()
        .map(|(i, (id, project))| {
            let marker = if i == app.picker_selected {
                Span::styled(icons.select.clone(), Style::default().fg(theme.selection))
            } else {
                Span::raw(" ")
            };
            let active = if *id == app.proj_id { " ◈" } else { "" };
            ListItem::new(Line::from(vec![
                marker,
                Span::raw(" "),
                Span::styled(
                    format!("{}{}", project.name, active),
                    Style::default().fg(accent(theme, &project.colour)),
                ),
            ]))
        })
        .collect();
    f.render_widget(List::new(items), inner);
}

/// Formats the header clock per the synced time format. None when the
/// clock is turned off.
fn clock_line(time: NaiveTime, format: &TimeFormat) -> Option<String> {
    if !format.show_time {
        return None;
    }
    let mut fmt = String::from(if format.is_24hour_time { "%H:%M" } else { "%-I:%M" });
    if format.show_seconds {
        fmt.push_str(":%S");
    }
    if !format.is_24hour_time {
        fmt.push_str(" %p");
    }
    Some(time.format(&fmt).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn full_frame_renders_three_bubble_rects() {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let mut app = App::new(crate::config::Config::default());
        let mut layout = UiLayout::default();
        terminal
            .draw(|f| layout = draw(f, &mut app, std::time::Duration::from_millis(16)))
            .unwrap();
        assert_eq!(layout.bubbles.len(), 3);
    }

    fn fmt(show_time: bool, show_seconds: bool, is_24hour_time: bool) -> TimeFormat {
        TimeFormat {
            show_time,
            show_seconds,
            is_24hour_time,
        }
    }

    #[test]
    fn clock_respects_the_time_format() {
        let t = NaiveTime::from_hms_opt(14, 5, 9).unwrap();
        assert_eq!(clock_line(t, &fmt(true, false, true)).unwrap(), "14:05");
        assert_eq!(clock_line(t, &fmt(true, true, true)).unwrap(), "14:05:09");
        assert_eq!(clock_line(t, &fmt(true, false, false)).unwrap(), "2:05 PM");
        assert_eq!(clock_line(t, &fmt(false, true, true)), None);
    }

    #[test]
    fn clock_handles_morning_hours_in_12h_mode() {
        let t = NaiveTime::from_hms_opt(0, 30, 0).unwrap();
        assert_eq!(clock_line(t, &fmt(true, false, false)).unwrap(), "12:30 AM");
    }
}
