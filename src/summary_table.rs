use crate::dashboard::{AssetPanel, DashboardView, format_change, format_price, format_timestamp};
use crate::refresh::DashboardState;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

fn right(cell: Cell) -> Cell {
    cell.set_alignment(CellAlignment::Right)
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label).add_attribute(Attribute::Bold)
}

fn change_color(panel: &AssetPanel) -> Color {
    match panel.change {
        Some(c) if c.is_up() => Color::Green,
        Some(_) => Color::Red,
        None => Color::DarkGrey,
    }
}

fn panel_row(panel: &AssetPanel) -> Vec<Cell> {
    let color = change_color(panel);
    let (change, change_pct) = panel
        .change
        .as_ref()
        .map(format_change)
        .unwrap_or_else(|| ("-".to_string(), "-".to_string()));

    let mut row = vec![
        Cell::new(&panel.asset_id).fg(Color::Cyan),
        right(Cell::new(panel.latest_price.map_or("-".to_string(), format_price))),
        right(Cell::new(change).fg(color)),
        right(Cell::new(change_pct).fg(color)),
    ];

    match &panel.statistics {
        Some(stats) => row.extend([
            right(Cell::new(format_price(stats.high)).fg(Color::Green)),
            right(Cell::new(format_price(stats.low)).fg(Color::Red)),
            right(Cell::new(format_price(stats.sma10))),
            right(Cell::new(format_price(stats.volatility))),
            right(Cell::new(stats.sample_count)),
        ]),
        None => row.push(Cell::new("No data available").fg(Color::DarkGrey)),
    }
    row
}

pub fn build_table(view: &DashboardView) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header_cell("Asset"),
            right(header_cell("Price")),
            right(header_cell("Change")),
            right(header_cell("Change (%)")),
            right(header_cell("High")),
            right(header_cell("Low")),
            right(header_cell("SMA (10)")),
            right(header_cell("Volatility")),
            right(header_cell("Data Points")),
        ]);

    for panel in &view.panels {
        table.add_row(panel_row(panel));
    }
    table
}

pub fn render(state: &DashboardState, asset_ids: &[String]) -> String {
    let view = DashboardView::build(state, asset_ids);
    let title = format!("(Data taken at {} UTC)", format_timestamp(state.last_updated));
    format!("{}\n{}", title, build_table(&view))
}
