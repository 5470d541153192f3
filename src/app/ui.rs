// Handles the rendering of widgets to the terminal frame.

use super::{App, LogView, Mode, Overlay};
use crate::manager::StateClass;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
};

/// Main render function called every frame.
pub fn render(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, chunks[0], app);
    render_service_table(f, chunks[1], app);
    render_footer(f, chunks[2], app);

    match app.overlay_mut() {
        Some(Overlay::Progress { action, unit }) => {
            let text = format!("{} {}...", action.progressive(), unit);
            render_message(f, " Working ", &text, "Esc: hide", Color::Cyan);
        }
        Some(Overlay::Error { message }) => {
            let message = message.clone();
            render_message(f, " Error ", &message, "Enter: OK", Color::Red);
        }
        Some(Overlay::Logs(view)) => render_logs(f, view),
        None => {}
    }
}

/// Colour bucket for a unit's active state.
pub fn state_color(class: StateClass) -> Color {
    match class {
        StateClass::Positive => Color::Green,
        StateClass::Negative => Color::Red,
        StateClass::Neutral => Color::DarkGray,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let table = app.table();
    let title = format!(
        " svcm - {} services ({}/{}) ",
        app.scope(),
        table.rows().len(),
        table.total()
    );
    let header = Paragraph::new(title).style(
        Style::default()
            .fg(Color::White)
            .bg(Color::Blue)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(header, area);
}

fn render_service_table(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .table()
        .rows()
        .iter()
        .map(|service| {
            let style = Style::default().fg(state_color(service.state_class()));
            Row::new(vec![
                Cell::from(service.name.clone()).style(style),
                Cell::from(service.active_state.clone()).style(style),
                Cell::from(service.sub_state.clone()).style(style),
                Cell::from(service.load_state.clone()),
                Cell::from(service.description.clone()),
            ])
        })
        .collect();

    let header = Row::new(["NAME", "ACTIVE", "SUB", "LOAD", "DESCRIPTION"]).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let widths = [
        Constraint::Percentage(30),
        Constraint::Length(13),
        Constraint::Length(14),
        Constraint::Length(10),
        Constraint::Min(10),
    ];

    let title = if app.table().filter().is_empty() {
        " Services ".to_string()
    } else {
        format!(" Services matching \"{}\" ", app.table().filter())
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(table, area, app.table_mut().state_mut());
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    if app.mode() == Mode::FilterEdit {
        let input = Line::from(vec![
            Span::styled("/", Style::default().fg(Color::LightRed)),
            Span::styled(
                format!("{}_", app.table().filter()),
                Style::default().fg(Color::Yellow),
            ),
        ]);
        let paragraph = Paragraph::new(input).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Filter (Enter: keep, Esc: clear) "),
        );
        f.render_widget(paragraph, area);
        return;
    }

    let help_text = if matches!(app.overlay(), Some(Overlay::Logs(_))) {
        Line::from(vec![
            Span::raw("Scroll: "),
            Span::styled("j/k ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Auto-Scroll: "),
            Span::styled("G ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Close: "),
            Span::styled("Esc/q/l ", Style::default().fg(Color::Red)),
        ])
    } else {
        Line::from(vec![
            Span::raw("Nav: "),
            Span::styled("j/k ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Filter: "),
            Span::styled("/ ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Logs: "),
            Span::styled("l ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Action: "),
            Span::styled(
                "s(start) x(stop) r(restart) ",
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("| Quit: "),
            Span::styled("q", Style::default().fg(Color::Red)),
        ])
    };

    let paragraph =
        Paragraph::new(help_text).block(Block::default().borders(Borders::ALL).title(" Controls "));

    f.render_widget(paragraph, area);
}

fn render_message(f: &mut Frame, title: &str, text: &str, hint: &str, color: Color) {
    let area = centered_rect(60, 25, f.area());
    f.render_widget(Clear, area);

    let content = vec![
        Line::from(text.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            hint.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];
    let paragraph = Paragraph::new(content)
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title(title.to_string()));

    f.render_widget(paragraph, area);
}

fn render_logs(f: &mut Frame, view: &mut LogView) {
    let area = centered_rect(80, 80, f.area());

    f.render_widget(Clear, area);

    let title = if view.stick_to_bottom {
        format!(" Logs: {} (Auto-scroll: ON) - Press 'j/k' to pause ", view.unit)
    } else {
        format!(" Logs: {} (Paused) - Press 'G' to resume ", view.unit)
    };

    let block = Block::default().borders(Borders::ALL).title(title);

    let content: Vec<Line> = match &view.text {
        Some(text) => text.lines().map(Line::from).collect(),
        None => vec![Line::from("Loading logs...")],
    };

    let visible = area.height.saturating_sub(2) as usize;
    let bottom = u16::try_from(content.len().saturating_sub(visible)).unwrap_or(u16::MAX);
    if view.stick_to_bottom || view.scroll > bottom {
        view.scroll = bottom;
    }

    let paragraph = Paragraph::new(content).block(block).scroll((view.scroll, 0));

    f.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
