//! Rendering of the top frame.
//!
//! Every function paints into a `Buffer` so views can be tested without a
//! terminal. Layout: a header row (title and query), the body (list with an
//! optional preview pane, or detail text), a footer with key hints, and
//! overlays (form, action menu, error) centered on top.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

use crate::form::Form;
use crate::page::Highlight;
use crate::runner::{
    ActionMenu, DetailContent, DetailView, ErrorOverlay, ListView, Overlay, PreviewState, Runner,
    RunnerView,
};

/// Display options taken from the `[ui]` config section.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub show_accessories: bool,
    /// Navigation stack depth, shown in the header when nested.
    pub depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_accessories: true,
            depth: 1,
        }
    }
}

pub fn render_runner(runner: &Runner, options: &RenderOptions, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(runner, options, chunks[0], buf);
    match runner.view() {
        RunnerView::Loading => {
            Paragraph::new(Span::styled("Loading...", Style::default().fg(Color::Gray)))
                .render(chunks[1], buf);
        }
        RunnerView::List(view) => render_list_view(view, options, chunks[1], buf),
        RunnerView::Detail(view) => render_detail_view(view, chunks[1], buf),
    }
    render_footer(runner, chunks[2], buf);

    match runner.overlay() {
        Some(Overlay::Form { form, .. }) => render_form(form, area, buf),
        Some(Overlay::Menu(menu)) => render_menu(menu, area, buf),
        None => {}
    }
    if let Some(error) = runner.error() {
        render_error(error, area, buf);
    }
}

fn render_header(runner: &Runner, options: &RenderOptions, area: Rect, buf: &mut Buffer) {
    let mut spans = Vec::new();
    if options.depth > 1 {
        spans.push(Span::styled(
            format!("{} ", "‹".repeat(options.depth - 1)),
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans.push(Span::styled(
        runner.title().to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    if matches!(runner.view(), RunnerView::List(_)) {
        spans.push(Span::raw("  > "));
        spans.push(Span::raw(runner.query().to_string()));
    }
    if runner.is_loading() && !matches!(runner.view(), RunnerView::Loading) {
        spans.push(Span::styled("  ⟳", Style::default().fg(Color::Yellow)));
    }
    Paragraph::new(Line::from(spans)).render(area, buf);
}

fn render_footer(runner: &Runner, area: Rect, buf: &mut Buffer) {
    let primary = match runner.view() {
        RunnerView::List(view) => view.actions().first().map(|action| action.display_title().to_string()),
        RunnerView::Detail(view) => view
            .detail
            .actions
            .first()
            .map(|action| action.display_title().to_string()),
        RunnerView::Loading => None,
    };
    let mut hints = Vec::new();
    if let Some(primary) = primary {
        hints.push(format!("enter {primary}"));
        hints.push("tab actions".to_string());
    }
    hints.push("ctrl+r reload".to_string());
    hints.push("esc back".to_string());
    Paragraph::new(Span::styled(
        hints.join("  ·  "),
        Style::default().fg(Color::DarkGray),
    ))
    .render(area, buf);
}

pub fn render_list_view(view: &ListView, options: &RenderOptions, area: Rect, buf: &mut Buffer) {
    let has_preview = view
        .selected_item()
        .is_some_and(|item| item.preview.is_some());
    let (list_area, preview_area) = if has_preview {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);
        (chunks[0], Some(chunks[1]))
    } else {
        (area, None)
    };

    let visible = view.visible();
    if visible.is_empty() {
        let text = view.list.empty_text.as_deref().unwrap_or("No items");
        Paragraph::new(Span::styled(
            text.to_string(),
            Style::default().fg(Color::Yellow),
        ))
        .render(list_area, buf);
    } else {
        let rows = usize::from(list_area.height.max(1));
        let selected = view.selected_position();
        // Keep the selection on screen.
        let offset = selected.saturating_sub(rows - 1);
        let width = usize::from(list_area.width);
        let lines: Vec<Line> = visible
            .iter()
            .enumerate()
            .skip(offset)
            .take(rows)
            .map(|(position, &index)| {
                let item = &view.list.items[index];
                let style = if position == selected {
                    Style::default()
                        .bg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                let mut spans = vec![Span::styled(item.title.clone(), style)];
                if let Some(subtitle) = &item.subtitle {
                    spans.push(Span::styled(
                        format!("  {subtitle}"),
                        style.fg(Color::Gray),
                    ));
                }
                if options.show_accessories && !item.accessories.is_empty() {
                    let used: usize = spans.iter().map(|span| span.content.chars().count()).sum();
                    let accessories = item.accessories.join("  ");
                    let pad = width.saturating_sub(used + accessories.chars().count());
                    spans.push(Span::styled(" ".repeat(pad.max(2)), style));
                    spans.push(Span::styled(accessories, style.fg(Color::Cyan)));
                }
                Line::from(spans)
            })
            .collect();
        Paragraph::new(lines).render(list_area, buf);
    }

    if let Some(preview_area) = preview_area {
        let block = Block::default().borders(Borders::LEFT);
        let inner = block.inner(preview_area);
        block.render(preview_area, buf);
        let (text, style) = match view.selected_preview() {
            Some(PreviewState::Ready(text)) => (clean_text(&text), Style::default()),
            Some(PreviewState::Failed(message)) => (message, Style::default().fg(Color::Red)),
            Some(PreviewState::Loading) | None => {
                ("Loading...".to_string(), Style::default().fg(Color::Gray))
            }
        };
        Paragraph::new(text)
            .style(style)
            .wrap(Wrap { trim: false })
            .render(inner, buf);
    }
}

pub fn render_detail_view(view: &DetailView, area: Rect, buf: &mut Buffer) {
    let lines: Vec<Line> = match &view.content {
        DetailContent::Loading => vec![Line::styled("Loading...", Style::default().fg(Color::Gray))],
        DetailContent::Ready(text) => {
            let text = clean_text(text);
            match view.detail.highlight {
                Some(Highlight::Markdown) => text.lines().map(markdown_line).collect(),
                _ => text.lines().map(|line| Line::raw(line.to_string())).collect(),
            }
        }
    };
    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((view.scroll, 0))
        .render(area, buf);
}

/// Escape sequences would corrupt the buffer, so they are stripped.
fn clean_text(text: &str) -> String {
    strip_ansi_escapes::strip_str(text).replace('\t', "    ")
}

fn markdown_line(line: &str) -> Line<'static> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        let heading = trimmed.trim_start_matches('#').trim_start();
        Line::styled(
            heading.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
    } else if trimmed.starts_with("```") {
        Line::styled(line.to_string(), Style::default().fg(Color::DarkGray))
    } else if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        Line::raw(format!("• {rest}"))
    } else {
        Line::raw(line.to_string())
    }
}

/// Rectangle of `width` x `height` centered in `area`, clamped to it.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

pub fn render_form(form: &Form, area: Rect, buf: &mut Buffer) {
    let fields: Vec<_> = form.visible_fields().collect();
    // Three rows per field plus borders, error and hint rows.
    let height = (fields.len() as u16).saturating_mul(3).saturating_add(4);
    let rect = centered(area, area.width.saturating_sub(8).max(20), height);
    Clear.render(rect, buf);
    let block = Block::default()
        .title(format!(" {} ", form.title))
        .borders(Borders::ALL);
    let inner = block.inner(rect);
    block.render(rect, buf);

    let mut lines = Vec::new();
    for (index, field) in fields {
        let focused = index == form.focus();
        let marker = if field.input.optional { "" } else { " *" };
        let label_style = if focused {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::styled(
            format!("{}{marker}", field.input.display_title()),
            label_style,
        ));
        let value = field.display_value();
        let shown = if value.is_empty() && !focused {
            Span::styled(
                field.input.placeholder.clone().unwrap_or_default(),
                Style::default().fg(Color::DarkGray),
            )
        } else if field.is_multiline() {
            Span::raw(value.replace('\n', " ⏎ "))
        } else {
            Span::raw(value)
        };
        let cursor = if focused { "▏" } else { " " };
        lines.push(Line::from(vec![Span::raw("  "), shown, Span::raw(cursor)]));
        lines.push(Line::raw(""));
    }
    if let Some(error) = form.error() {
        lines.push(Line::styled(error.to_string(), Style::default().fg(Color::Red)));
    }
    lines.push(Line::styled(
        "tab next · ctrl+s submit · esc cancel",
        Style::default().fg(Color::DarkGray),
    ));
    Paragraph::new(lines).render(inner, buf);
}

pub fn render_menu(menu: &ActionMenu, area: Rect, buf: &mut Buffer) {
    let width = menu
        .actions
        .iter()
        .map(|action| {
            action.display_title().chars().count()
                + action.key.as_deref().map_or(0, |key| key.len() + 2)
        })
        .max()
        .unwrap_or(0) as u16;
    let rect = centered(
        area,
        width.saturating_add(6).max(24),
        (menu.actions.len() as u16).saturating_add(2),
    );
    Clear.render(rect, buf);
    let block = Block::default().title(" Actions ").borders(Borders::ALL);
    let inner = block.inner(rect);
    block.render(rect, buf);

    let lines: Vec<Line> = menu
        .actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let style = if index == menu.selected {
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mut spans = vec![Span::styled(action.display_title().to_string(), style)];
            if let Some(key) = &action.key {
                spans.push(Span::styled(format!("  {key}"), style.fg(Color::Gray)));
            }
            Line::from(spans)
        })
        .collect();
    Paragraph::new(lines).render(inner, buf);
}

pub fn render_error(error: &ErrorOverlay, area: Rect, buf: &mut Buffer) {
    let width = area.width.saturating_sub(8).max(20);
    let text_width = usize::from(width.saturating_sub(2).max(1));
    let rows: usize = error
        .message
        .lines()
        .map(|line| line.chars().count().div_ceil(text_width).max(1))
        .sum();
    let rect = centered(area, width, (rows as u16).saturating_add(4));
    Clear.render(rect, buf);
    let block = Block::default()
        .title(" Error ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let inner = block.inner(rect);
    block.render(rect, buf);

    let mut lines: Vec<Line> = error
        .message
        .lines()
        .map(|line| Line::raw(line.to_string()))
        .collect();
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        "enter copy message · esc dismiss",
        Style::default().fg(Color::DarkGray),
    ));
    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .render(inner, buf);
}
