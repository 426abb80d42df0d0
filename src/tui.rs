use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    symbols,
    text::Line,
    widgets::{Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row, Table},
};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::dashboard::{AssetPanel, DashboardView, format_change, format_price, format_timestamp};
use crate::refresh::{DashboardState, RefreshHandle, RefreshStatus};

const SERIES_COLORS: [Color; 4] = [
    Color::Rgb(247, 147, 26),
    Color::Rgb(98, 126, 234),
    Color::Cyan,
    Color::Magenta,
];

fn series_color(index: usize) -> Color {
    SERIES_COLORS[index % SERIES_COLORS.len()]
}

// --- TUI ---

/// Takes over the terminal until `q` is pressed, then stops the refresh task.
pub async fn run_tui(handle: RefreshHandle, assets: Vec<String>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &handle, &assets).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    handle.stop().await;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, handle: &RefreshHandle, assets: &[String]) -> Result<()> {
    loop {
        let state: Arc<DashboardState> = handle.state();
        terminal.draw(|f| ui(f, &state, assets))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if !handle_key_event(key, handle) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns `false` when the user asked to quit.
fn handle_key_event(key: KeyEvent, handle: &RefreshHandle) -> bool {
    if key.kind != KeyEventKind::Press {
        return true;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Char('r') | KeyCode::F(5) => handle.retry(),
        _ => {}
    }
    true
}

pub fn ui(f: &mut Frame, state: &DashboardState, assets: &[String]) {
    let view = DashboardView::build(state, assets);

    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Min(8),
        Constraint::Length(9),
    ])
    .split(f.size());

    render_header(f, state, chunks[0]);
    render_price_cards(f, &view, chunks[1]);
    render_chart(f, &view, chunks[2]);
    render_statistics(f, &view, chunks[3]);

    match &state.status {
        RefreshStatus::Loading => {
            let area = centered_rect(50, 20, f.size());
            f.render_widget(Clear, area);
            f.render_widget(
                Paragraph::new("Loading price data...")
                    .block(Block::default().borders(Borders::ALL))
                    .alignment(Alignment::Center),
                area,
            );
        }
        RefreshStatus::Error(message) => {
            let area = centered_rect(60, 25, f.size());
            f.render_widget(Clear, area);
            f.render_widget(
                Paragraph::new(vec![
                    Line::from(message.as_str()),
                    Line::from(""),
                    Line::from("Press r to retry now").style(Style::default().fg(Color::Yellow)),
                ])
                .wrap(ratatui::widgets::Wrap { trim: true })
                .block(
                    Block::default()
                        .title("Connection Error")
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Red)),
                )
                .alignment(Alignment::Center),
                area,
            );
        }
        RefreshStatus::Loaded => {}
    }
}

fn render_header(f: &mut Frame, state: &DashboardState, area: Rect) {
    let (live, color) = match state.status {
        RefreshStatus::Loaded => ("Live", Color::Green),
        RefreshStatus::Loading => ("Loading", Color::Yellow),
        RefreshStatus::Error(_) => ("Stale", Color::Red),
    };
    let title = Line::from(vec![
        Span::raw(format!(" Last Updated: {} UTC  ", format_timestamp(state.last_updated))),
        Span::styled(format!("● {live} "), Style::default().fg(color)),
    ]);
    f.render_widget(
        Paragraph::new("q quits, r refreshes now").alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::ALL)
                .title_alignment(Alignment::Center)
                .title(title),
        ),
        area,
    );
}

fn render_price_cards(f: &mut Frame, view: &DashboardView, area: Rect) {
    if view.panels.is_empty() {
        return;
    }
    let constraints = vec![Constraint::Ratio(1, view.panels.len() as u32); view.panels.len()];
    let cards = Layout::horizontal(constraints).split(area);

    for (i, panel) in view.panels.iter().enumerate() {
        f.render_widget(price_card(panel, series_color(i)), cards[i]);
    }
}

fn price_card(panel: &AssetPanel, accent: Color) -> Paragraph<'_> {
    let price = panel.latest_price.unwrap_or(0.0);
    let mut lines = vec![Line::from(format_price(price)).style(Style::default().bold())];

    if let Some(change) = &panel.change {
        let (abs, pct) = format_change(change);
        let color = if change.is_up() { Color::Green } else { Color::Red };
        lines.push(Line::from(format!("{abs}  ({pct})")).style(Style::default().fg(color)));
    }

    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(panel.asset_id.as_str())
            .border_style(Style::default().fg(accent)),
    )
}

fn render_chart(f: &mut Frame, view: &DashboardView, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Price Chart");
    let Some((lo, hi)) = view.price_bounds() else {
        f.render_widget(Paragraph::new("No data").block(block), area);
        return;
    };

    // Zero-padded slots are left out of the plotted line.
    let lines: Vec<Vec<(f64, f64)>> = view
        .panels
        .iter()
        .map(|panel| {
            view.chart
                .iter()
                .enumerate()
                .map(|(x, point)| (x as f64, point.value(&panel.asset_id)))
                .filter(|&(_, y)| y != 0.0)
                .collect()
        })
        .collect();

    let datasets = view
        .panels
        .iter()
        .zip(&lines)
        .enumerate()
        .map(|(i, (panel, data))| {
            Dataset::default()
                .name(panel.asset_id.as_str())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(series_color(i)))
                .data(data)
        })
        .collect();

    let x_max = view.chart.len().saturating_sub(1).max(1) as f64;
    let first = view.chart.first().map(|p| p.slot_label.clone()).unwrap_or_default();
    let last = view.chart.last().map(|p| p.slot_label.clone()).unwrap_or_default();
    let pad = ((hi - lo) * 0.05).max(1.0);

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .title("Time")
                .bounds([0.0, x_max])
                .labels(vec![Span::raw(first), Span::raw(last)]),
        )
        .y_axis(
            Axis::default()
                .title("Price (USD)")
                .bounds([lo - pad, hi + pad])
                .labels(vec![Span::raw(format_price(lo)), Span::raw(format_price(hi))]),
        );
    f.render_widget(chart, area);
}

fn render_statistics(f: &mut Frame, view: &DashboardView, area: Rect) {
    if view.panels.is_empty() {
        return;
    }
    let constraints = vec![Constraint::Ratio(1, view.panels.len() as u32); view.panels.len()];
    let columns = Layout::horizontal(constraints).split(area);

    for (i, panel) in view.panels.iter().enumerate() {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("{} Statistics", panel.asset_id));

        let Some(stats) = panel.statistics else {
            f.render_widget(
                Paragraph::new("No data available")
                    .style(Style::default().fg(Color::DarkGray))
                    .block(block),
                columns[i],
            );
            continue;
        };

        let stat_row = |label: &'static str, value: String, color: Color| {
            Row::new([
                Cell::from(label).style(Style::default().fg(Color::Gray)),
                Cell::from(Line::from(value).alignment(Alignment::Right)).style(Style::default().fg(color)),
            ])
        };
        let rows = vec![
            stat_row("Current Price", format_price(stats.current), Color::Blue),
            stat_row("High", format_price(stats.high), Color::Green),
            stat_row("Low", format_price(stats.low), Color::Red),
            stat_row("SMA (10)", format_price(stats.sma10), Color::White),
            stat_row("Volatility", format_price(stats.volatility), Color::White),
            stat_row("Data Points", stats.sample_count.to_string(), Color::White),
        ];

        f.render_widget(
            Table::new(rows, [Constraint::Percentage(50), Constraint::Percentage(50)]).block(block),
            columns[i],
        );
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotMap;
    use crate::models::fixtures::*;
    use ratatui::backend::TestBackend;

    fn assets() -> Vec<String> {
        vec!["BTC-USD".to_string(), "ETH-USD".to_string()]
    }

    fn screen(state: &DashboardState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 40)).unwrap();
        terminal.draw(|f| ui(f, state, &assets())).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn loaded_state() -> DashboardState {
        let mut snapshot = SnapshotMap::new();
        snapshot.insert("BTC-USD", series("BTC-USD", &[(0, 100.0), (1, 110.0)]));
        snapshot.insert("ETH-USD", series("ETH-USD", &[(0, 2000.0)]));
        DashboardState::initial().loaded(snapshot, at(0))
    }

    #[test]
    fn loading_screen() {
        let out = screen(&DashboardState::initial());
        assert!(out.contains("Loading price data..."));
        assert!(out.contains("Never"));
    }

    #[test]
    fn loaded_screen_shows_cards_and_statistics() {
        let out = screen(&loaded_state());
        assert!(out.contains("BTC-USD Statistics"));
        assert!(out.contains("$110.00"));
        assert!(out.contains("+$10.00"));
        assert!(out.contains("$2,000.00"));
        assert!(out.contains("Price Chart"));
        assert!(!out.contains("Connection Error"));
    }

    #[test]
    fn error_popup_over_stale_data() {
        let state = loaded_state().failed("Failed to fetch data".into());
        let out = screen(&state);
        assert!(out.contains("Connection Error"));
        assert!(out.contains("Press r to retry now"));
        assert!(out.contains("Stale"));
    }
}
