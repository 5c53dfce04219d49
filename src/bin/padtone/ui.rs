//! Terminal layout: the pad surface and a status panel showing the engine's
//! telemetry surface (voice slots, master level, live fx parameters,
//! per-voice errors).

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::Telemetry;

/// Render one frame; returns the pad rect so mouse events can be mapped
/// back into pad coordinates.
pub fn draw(frame: &mut Frame, telemetry: &Telemetry) -> Rect {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(9)])
        .split(frame.area());

    let pad = Block::default()
        .borders(Borders::ALL)
        .title(" pad - drag to play, q to quit ")
        .title_style(Style::default().add_modifier(Modifier::BOLD));
    frame.render_widget(pad, chunks[0]);

    render_status(frame, chunks[1], telemetry);

    chunks[0]
}

fn render_status(frame: &mut Frame, area: Rect, telemetry: &Telemetry) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(20)])
        .split(area);

    let mut voice_lines: Vec<Line> = vec![Line::from(format!(
        "voices {}/{}   master {:+.1} dB",
        telemetry.active, telemetry.polyphony, telemetry.master_db
    ))];
    for (index, (busy, touch)) in telemetry.voices.iter().enumerate() {
        let line = match touch {
            Some(touch) if *busy => format!("  {index}: busy (touch {touch})"),
            _ => format!("  {index}: free"),
        };
        let style = if *busy {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        voice_lines.push(Line::styled(line, style));
    }
    for error in &telemetry.errors {
        voice_lines.push(Line::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ));
    }

    let voices = Paragraph::new(voice_lines)
        .block(Block::default().borders(Borders::ALL).title(" voices "));
    frame.render_widget(voices, columns[0]);

    let fx_lines: Vec<Line> = telemetry
        .fx
        .iter()
        .map(|settings| Line::from(settings.clone()))
        .collect();
    let fx = Paragraph::new(fx_lines).block(Block::default().borders(Borders::ALL).title(" fx "));
    frame.render_widget(fx, columns[1]);
}
