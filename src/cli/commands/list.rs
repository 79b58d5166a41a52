use crate::cli::parser::Commands;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::models::shift::Shift;
use crate::store::ShiftStore;
use crate::store::sqlite::SqliteShiftStore;
use crate::utils::colors::{GREY, color_for_status};
use crate::utils::formatting::bold;
use crate::utils::hours2readable;
use crate::utils::table::{Cell, Column, Table};
use crate::utils::time::format_opt_time;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::List { json } = cmd else {
        return Ok(());
    };

    let store = SqliteShiftStore::open(&cfg.database)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let shifts = runtime.block_on(store.list_shifts())?;

    if *json {
        let out =
            serde_json::to_string_pretty(&shifts).map_err(|e| AppError::Other(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    if shifts.is_empty() {
        println!("No shifts recorded.");
        return Ok(());
    }

    println!("{}\n", bold("SHIFTS"));
    print!("{}", render_shifts(&shifts));
    Ok(())
}

fn time_cell(t: Option<chrono::NaiveTime>) -> Cell {
    match t {
        Some(_) => format_opt_time(t).into(),
        None => Cell::colored(format_opt_time(t), GREY),
    }
}

fn render_shifts(shifts: &[Shift]) -> String {
    let mut table = Table::new(vec![
        Column::right("ID", 4),
        Column::left("DATE", 10),
        Column::left("IN", 5),
        Column::left("OUT", 5),
        Column::right("HOURS", 8),
        Column::right("BLOCKS", 6),
        Column::left("STATUS", 11),
    ]);

    for s in shifts {
        let hours = s
            .total_hours
            .map(hours2readable)
            .unwrap_or_else(|| "--".to_string());
        table.add_row(vec![
            s.id.to_string().into(),
            s.date_str().into(),
            time_cell(s.clock_in),
            time_cell(s.clock_out),
            hours.into(),
            s.blocks.len().to_string().into(),
            Cell::colored(s.status.to_db_str(), color_for_status(&s.status)),
        ]);
    }

    table.render()
}
