//! `track`: line-oriented front end of the shift engine.
//!
//! Commands are read from stdin one per line. Background save results are
//! picked up between commands on the same single-threaded runtime.

use crate::config::Config;
use crate::core::autosave::{AutoSaver, SaveEvent};
use crate::core::calculator::gaps::{GapDescriptor, Reconciliation};
use crate::core::clock::{Clock, SystemClock};
use crate::core::picker::{current_end_choices, fill_end_choices};
use crate::core::recovery::{self, RecoveryChoice, RecoveryOutcome};
use crate::core::sequence::Rollback;
use crate::core::session::{EditState, Session};
use crate::errors::{AppError, AppResult};
use crate::models::shift::Shift;
use crate::models::time_block::TimeBlock;
use crate::store::ShiftStore;
use crate::store::sqlite::SqliteShiftStore;
use crate::ui::messages::{ask, choices, error, header, info, save_indicator, success, warning};
use crate::utils::colors::{CYAN, GREY, RESET, YELLOW};
use crate::utils::date::format_date;
use crate::utils::formatting::{bold, italic, pad_right};
use crate::utils::time::{
    elapsed_minutes, format_hours, format_minutes, format_opt_time, format_time, parse_time,
};
use chrono::NaiveTime;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

const HELP: &str = "\
Commands:
  show                          print the shift
  start HH:MM | end HH:MM       set the current block's start / end
  task TEXT                     add a task to the current block
  next                          complete the current block
  break                         insert a 15 minute break
  edit N                        open block N for editing
  save HH:MM HH:MM [TEXT]       save the block being edited
  cancel                        cancel the edit
  delete N                      delete block N
  fill HH:MM [TEXT|break]       fill the open gap from its start to HH:MM
  close-gap                     dismiss the gap dialog (the gap stays)
  undo                          undo the change that opened the gap
  clockout                      submit the shift for approval
  discard                       throw the shift away
  quit                          leave; the shift stays open for later";

#[derive(Debug, Clone, PartialEq)]
pub enum TrackCommand {
    Show,
    Help,
    Start(NaiveTime),
    End(NaiveTime),
    Task(String),
    Next,
    Break,
    Edit(usize),
    Save {
        start: NaiveTime,
        end: NaiveTime,
        tasks: Option<String>,
    },
    Cancel,
    Delete(usize),
    Fill {
        end: NaiveTime,
        tasks: String,
        is_break: bool,
    },
    CloseGap,
    Undo,
    ClockOut,
    Discard,
    Quit,
}

fn time_arg(arg: Option<&str>) -> AppResult<NaiveTime> {
    let raw = arg.ok_or_else(|| AppError::Validation("A time (HH:MM) is required.".into()))?;
    parse_time(raw).ok_or_else(|| AppError::InvalidTime(raw.to_string()))
}

/// 1-based block number as typed by the user, turned into a list index.
fn index_arg(arg: Option<&str>) -> AppResult<usize> {
    let raw = arg.ok_or_else(|| AppError::Validation("A block number is required.".into()))?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(AppError::Validation(format!("Invalid block number: {}", raw))),
    }
}

impl TrackCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> AppResult<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let mut args = rest.splitn(3, char::is_whitespace).filter(|a| !a.is_empty());

        let cmd = match word.to_lowercase().as_str() {
            "show" | "ls" => TrackCommand::Show,
            "help" | "?" => TrackCommand::Help,
            "start" => TrackCommand::Start(time_arg(args.next())?),
            "end" => TrackCommand::End(time_arg(args.next())?),
            "task" => {
                if rest.is_empty() {
                    return Err(AppError::Validation("Please describe the task.".into()));
                }
                TrackCommand::Task(rest.to_string())
            }
            "next" => TrackCommand::Next,
            "break" => TrackCommand::Break,
            "edit" => TrackCommand::Edit(index_arg(args.next())?),
            "save" => {
                let start = time_arg(args.next())?;
                let end = time_arg(args.next())?;
                let tasks = args.next().map(|t| t.trim().to_string());
                TrackCommand::Save { start, end, tasks }
            }
            "cancel" => TrackCommand::Cancel,
            "delete" | "del" => TrackCommand::Delete(index_arg(args.next())?),
            "fill" => {
                let mut parts = rest.splitn(2, char::is_whitespace);
                let end = time_arg(parts.next())?;
                let text = parts.next().unwrap_or("").trim();
                let is_break = text.eq_ignore_ascii_case("break");
                TrackCommand::Fill {
                    end,
                    tasks: if is_break { String::new() } else { text.to_string() },
                    is_break,
                }
            }
            "close-gap" => TrackCommand::CloseGap,
            "undo" => TrackCommand::Undo,
            "clockout" | "clock-out" => TrackCommand::ClockOut,
            "discard" => TrackCommand::Discard,
            "quit" | "exit" | "q" => TrackCommand::Quit,
            other => {
                return Err(AppError::Validation(format!(
                    "Unknown command '{}'. Type 'help' for the list.",
                    other
                )));
            }
        };
        Ok(Some(cmd))
    }
}

pub fn handle(cfg: &Config) -> AppResult<()> {
    let store = Arc::new(SqliteShiftStore::open(&cfg.database)?);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        let input = BufReader::new(tokio::io::stdin());
        run_tracker(store, &SystemClock, cfg, input).await
    });
    // A pending stdin read must not keep the process alive.
    runtime.shutdown_background();
    result
}

enum Flow {
    Continue,
    Stop,
}

/// Drive the engine from `input` until quit, clock out, discard or EOF.
pub async fn run_tracker<S, R>(
    store: Arc<S>,
    clock: &dyn Clock,
    cfg: &Config,
    input: R,
) -> AppResult<()>
where
    S: ShiftStore + 'static,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    let Some((mut session, mut saver)) = start_session(&store, clock, cfg, &mut lines).await?
    else {
        return Ok(());
    };
    render(&session, &saver);

    loop {
        tokio::select! {
            biased;

            Some(msg) = saver.recv() => {
                let event = saver.apply(msg, &mut session);
                report_save(&event, &session);
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let cmd = match TrackCommand::parse(&line) {
                    Ok(Some(cmd)) => cmd,
                    Ok(None) => continue,
                    Err(e) => {
                        report_error(&e);
                        continue;
                    }
                };
                match execute(cmd, &mut session, &mut saver, &mut lines).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => return Ok(()),
                    Err(e) => report_error(&e),
                }
            }
        }
    }

    // EOF: let in-flight saves land before leaving.
    for event in saver.drain(&mut session).await {
        report_save(&event, &session);
    }
    if !session.sequence().is_empty() {
        info("Shift left open; run `rshiftlog track` again to continue.");
    }
    Ok(())
}

async fn start_session<S, R>(
    store: &Arc<S>,
    clock: &dyn Clock,
    cfg: &Config,
    lines: &mut Lines<R>,
) -> AppResult<Option<(Session, AutoSaver<S>)>>
where
    S: ShiftStore + 'static,
    R: AsyncBufRead + Unpin,
{
    if let Some(open) = recovery::find_open_shift(store.as_ref()).await? {
        warning(format!(
            "An unfinished shift from {} was found.",
            format_date(open.date)
        ));
        print_stored_shift(&open);

        loop {
            ask("Choose: resume | close | discard");
            let Some(line) = lines.next_line().await? else {
                return Ok(None);
            };
            let Some(choice) = RecoveryChoice::from_input(&line) else {
                warning(format!("'{}' is not one of resume, close, discard.", line.trim()));
                continue;
            };

            match recovery::resolve(store.as_ref(), open.clone(), choice).await {
                Ok(RecoveryOutcome::Resumed(session, shift)) => {
                    success(format!("Resumed shift of {}.", format_date(shift.date)));
                    let saver = AutoSaver::resume(Arc::clone(store), &shift)
                        .with_indicator_delay(cfg.save_indicator_delay());
                    return Ok(Some((session, saver)));
                }
                Ok(RecoveryOutcome::Closed(shift)) => {
                    success(format!(
                        "Shift of {} closed with {} h and submitted for approval.",
                        format_date(shift.date),
                        format_hours(shift.total_hours.unwrap_or(0.0))
                    ));
                    break;
                }
                Ok(RecoveryOutcome::Discarded) => {
                    success("Unfinished shift discarded.");
                    break;
                }
                Err(e) => report_error(&e),
            }
        }
    }

    let mut session = Session::new();
    let start = session.clock_in(clock, cfg.round_clock_in)?;
    success(format!(
        "Clocked in on {} at {}.",
        format_date(clock.today()),
        format_time(start)
    ));
    let saver = AutoSaver::new(Arc::clone(store), clock.today())
        .with_indicator_delay(cfg.save_indicator_delay());
    Ok(Some((session, saver)))
}

async fn confirm<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>, prompt: &str) -> AppResult<bool> {
    ask(format!("{} [y/N]", prompt));
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn execute<S, R>(
    cmd: TrackCommand,
    session: &mut Session,
    saver: &mut AutoSaver<S>,
    lines: &mut Lines<R>,
) -> AppResult<Flow>
where
    S: ShiftStore + 'static,
    R: AsyncBufRead + Unpin,
{
    match cmd {
        TrackCommand::Show => render(session, saver),
        TrackCommand::Help => println!("{}", HELP),
        TrackCommand::Start(t) => {
            session.set_current_start(t)?;
            print_current(session);
        }
        TrackCommand::End(t) => {
            session.set_current_end(t)?;
            print_current(session);
        }
        TrackCommand::Task(text) => {
            session.add_task(&text);
            print_current(session);
        }
        TrackCommand::Next => {
            let id = session.append_current()?;
            saver.queue_append(session, id)?;
            render(session, saver);
        }
        TrackCommand::Break => {
            let id = session.insert_break()?;
            saver.queue_append(session, id)?;
            render(session, saver);
        }
        TrackCommand::Edit(index) => {
            let original = session.begin_edit(index)?;
            info(format!(
                "Editing block {} ({}). Use `save START END [TEXT]` or `cancel`.",
                index + 1,
                original.label()
            ));
            if let Some(bounds) = session.edit_bounds()
                && let Some((start, end)) = original.span()
            {
                choices("start choices", join_times(&bounds.start_choices(end)));
                choices("end choices", join_times(&bounds.end_choices(start)));
            }
        }
        TrackCommand::Save { start, end, tasks } => {
            let rec = session.save_edit(start, end, tasks.as_deref())?;
            report_reconciliation(&rec);
            render(session, saver);
        }
        TrackCommand::Cancel => {
            session.cancel_edit()?;
            info("Edit cancelled.");
            render(session, saver);
        }
        TrackCommand::Delete(index) => {
            if let Some(gap) = session.delete_block(index)? {
                report_gap(&gap);
            } else {
                success(format!("Block {} deleted.", index + 1));
            }
            render(session, saver);
        }
        TrackCommand::Fill {
            end,
            tasks,
            is_break,
        } => {
            let rec = session.fill_gap(end, &tasks, is_break)?;
            report_reconciliation(&rec);
            render(session, saver);
        }
        TrackCommand::CloseGap => match session.close_gap_modal() {
            Some(gap) => warning(format!(
                "Gap {}-{} is still open; fill it or undo before clocking out.",
                format_time(gap.start),
                format_time(gap.end)
            )),
            None => info("No gap is open."),
        },
        TrackCommand::Undo => {
            session.undo()?;
            success("Change undone.");
            render(session, saver);
        }
        TrackCommand::ClockOut => {
            if session.has_unfilled_gaps() {
                warning("There are gaps between blocks; clocking out will be refused.");
            }
            if !confirm(
                lines,
                &format!(
                    "Submit the shift with {} h for approval?",
                    format_hours(session.total_hours())
                ),
            )
            .await?
            {
                info("Clock out cancelled.");
                return Ok(Flow::Continue);
            }
            let shift = saver.complete_shift(session).await?;
            success(format!(
                "Clocked out {}-{}: {} h submitted for approval.",
                format_opt_time(shift.clock_in),
                format_opt_time(shift.clock_out),
                format_hours(shift.total_hours.unwrap_or(0.0))
            ));
            return Ok(Flow::Stop);
        }
        TrackCommand::Discard => {
            if !confirm(lines, "Discard this shift and all its blocks?").await? {
                info("Discard cancelled.");
                return Ok(Flow::Continue);
            }
            saver.discard_shift(session).await?;
            success("Shift discarded.");
            return Ok(Flow::Stop);
        }
        TrackCommand::Quit => {
            for event in saver.drain(session).await {
                report_save(&event, session);
            }
            info("Shift left open; run `rshiftlog track` again to continue.");
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

// ---------------------------
// Output
// ---------------------------

fn report_error(e: &AppError) {
    if e.is_validation() {
        warning(e);
    } else {
        error(e);
    }
}

fn report_save(event: &SaveEvent, session: &Session) {
    match event {
        SaveEvent::Saved { local_id, .. } => {
            if let Some(b) = session.completed_blocks().iter().find(|b| b.id == *local_id) {
                success(format!("Saved {}", b.label()));
            }
        }
        SaveEvent::RolledBack { error: e, outcome, .. } => match outcome {
            Rollback::Restored => error(format!(
                "Save failed ({}); the block is back in the current block, try `next` again.",
                e
            )),
            Rollback::KeptUnsaved => warning(format!(
                "Save failed ({}); the block is kept and will be saved on clock out.",
                e
            )),
            Rollback::Missing => error(format!("Save failed ({}).", e)),
        },
        SaveEvent::Stale { .. } | SaveEvent::StatusReset | SaveEvent::Ignored => {}
    }
}

fn report_gap(gap: &GapDescriptor) {
    warning(format!(
        "Gap {}-{} ({}). Fill it with `fill HH:MM [TEXT]` or `undo`.",
        format_time(gap.start),
        format_time(gap.end),
        format_minutes(gap.minutes())
    ));
    let ends = fill_end_choices(gap);
    if !ends.is_empty() {
        choices("fill end choices", join_times(&ends));
    }
}

fn report_reconciliation(rec: &Reconciliation) {
    if !rec.removed.is_empty() {
        warning(format!(
            "{} overlapped block(s) were absorbed.",
            rec.removed.len()
        ));
    }
    if rec.clamped.is_some() {
        warning("The following block was shortened to remove the overlap.");
    }
    match &rec.gap {
        Some(gap) => report_gap(gap),
        None => success("Block saved."),
    }
}

fn join_times(times: &[NaiveTime]) -> String {
    times
        .iter()
        .map(|t| format_time(*t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn block_line(n: usize, b: &TimeBlock) -> String {
    if b.is_gap() {
        return format!(
            "{}{:>3}. {} gap ({}){}",
            YELLOW,
            n,
            b.label(),
            format_minutes(b.span().map(|(s, e)| elapsed_minutes(s, e)).unwrap_or(0)),
            RESET
        );
    }
    if b.is_editing_placeholder() {
        return format!("{}{:>3}. {} {}{}", CYAN, n, b.label(), italic("(editing)"), RESET);
    }
    let saved = if b.server_id.is_some() {
        ""
    } else {
        " (unsaved)"
    };
    let tasks = if b.is_break {
        italic(&b.tasks)
    } else {
        b.task_entries().join(", ")
    };
    format!(
        "{:>3}. {}  {}h  {}{}{}{}",
        n,
        b.label(),
        pad_right(&format_hours(b.hours()), 5),
        tasks,
        GREY,
        saved,
        RESET
    )
}

fn print_current(session: &Session) {
    match session.current_block() {
        Some(cur) => {
            let tasks = if cur.tasks.is_empty() {
                "-".to_string()
            } else {
                cur.task_entries().join(", ")
            };
            println!("  > {}  {}", cur.label(), tasks);
            if let Some(start) = cur.start
                && cur.end.is_none()
            {
                choices("end choices", join_times(&current_end_choices(start)));
            }
        }
        None => println!("  > (no current block)"),
    }
}

fn render<S: ShiftStore + 'static>(session: &Session, saver: &AutoSaver<S>) {
    header("Shift");
    for (i, b) in session.completed_blocks().iter().enumerate() {
        println!("{}", block_line(i + 1, b));
    }
    print_current(session);
    println!(
        "\n{} {} h   {}",
        bold("Total:"),
        format_hours(session.total_hours()),
        save_indicator(saver.status())
    );
    match session.editing_state() {
        EditState::Editing { original_index, .. } => {
            info(format!("Block {} is being edited.", original_index + 1));
        }
        EditState::GapOpen { gap } => report_gap(gap),
        EditState::Idle => {}
    }
}

fn print_stored_shift(shift: &Shift) {
    for (i, b) in shift.blocks.iter().enumerate() {
        println!(
            "{:>3}. {}-{}  {}",
            i + 1,
            format_time(b.start),
            format_time(b.end),
            b.tasks
        );
    }
    if shift.blocks.is_empty() {
        println!("  (no saved blocks)");
    }
}
