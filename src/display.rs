use crate::{
    events::SystemEvent,
    request::Request,
    stats::OccupancySample,
};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEventKind};
use ratatui::{
    Frame, Terminal, backend,
    layout::{self, Constraint, Layout, Rect},
    prelude::CrosstermBackend,
    style::{self, Style},
    symbols, text,
    widgets::{Axis, Block, Chart, Dataset, GraphType, List, ListItem, ListState, Paragraph},
};
use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};
use tokio::sync::mpsc::{Receiver, error::TryRecvError};

static SELECTED_LOG: AtomicUsize = AtomicUsize::new(0);

const LOG_CAPACITY: usize = 200;

#[derive(Debug, Default)]
struct DisplayStats {
    arrivals: u64,
    processed: u64,
    rejected: u64,
    displaced: u64,
    total_waiting: f64,
}

impl DisplayStats {
    fn mean_waiting(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.total_waiting / self.processed as f64
        }
    }
}

struct DisplayState {
    capacity: usize,
    now: f64,
    waiting: Vec<Request>,
    in_service: Option<(Request, f64)>,
    occupancy: Vec<(f64, f64)>,
    logs: Vec<String>,
    stats: DisplayStats,
    finished: bool,
}

impl DisplayState {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            now: 0.0,
            waiting: Vec::with_capacity(capacity),
            in_service: None,
            occupancy: Vec::new(),
            logs: Vec::with_capacity(LOG_CAPACITY),
            stats: DisplayStats::default(),
            finished: false,
        }
    }
}

/// Replays the event stream of a running simulation until the user presses `q`.
///
/// At most `events_per_frame` events are applied per frame so that a run in
/// compressed time can still be followed on screen.
pub fn run_ui(
    mut ui_rx: Receiver<SystemEvent>,
    capacity: usize,
    events_per_frame: usize,
) -> io::Result<()> {
    let mut terminal = init_terminal()?;
    let mut state = DisplayState::new(capacity);

    let mut last_frame = Instant::now();
    let frame_rate = Duration::from_millis(33); // 30 FPS

    loop {
        let elapsed = last_frame.elapsed();
        if elapsed < frame_rate {
            thread::sleep(frame_rate - elapsed);
        }
        last_frame = Instant::now();

        for _ in 0..events_per_frame.max(1) {
            match ui_rx.try_recv() {
                Ok(event) => update_state(&mut state, event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !state.finished {
                        state.finished = true;
                        add_log(&mut state.logs, "Simulation finished".to_string());
                    }
                    break;
                }
            }
        }

        terminal.draw(|frame| {
            render_system_ui(frame, &state);
        })?;

        if handle_events()? {
            break;
        }
    }

    restore_terminal(&mut terminal).ok();
    Ok(())
}

fn init_terminal() -> io::Result<Terminal<CrosstermBackend<std::io::Stdout>>> {
    let stdout = io::stdout();
    let backend = backend::CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;

    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(
        io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )
    .ok();

    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> io::Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::event::DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}

fn update_state(state: &mut DisplayState, event: SystemEvent) {
    match event {
        SystemEvent::RequestArrived(request) => {
            state.now = request.arrival_time;
            state.stats.arrivals += 1;
            add_log(
                &mut state.logs,
                format!("t={:.3} {} arrived", request.arrival_time, request.get_name()),
            );
        }
        SystemEvent::ServiceStarted {
            request,
            completion_time,
        } => {
            state.waiting.retain(|r| r.id != request.id);
            state.in_service = Some((request, completion_time));
            add_log(
                &mut state.logs,
                format!(
                    "t={:.3} {} in service until {:.3}",
                    state.now,
                    request.get_name(),
                    completion_time
                ),
            );
        }
        SystemEvent::RequestQueued { request, queue_len } => {
            insert_waiting(&mut state.waiting, request);
            add_log(
                &mut state.logs,
                format!("{} queued ({queue_len} waiting)", request.get_name()),
            );
        }
        SystemEvent::RequestDisplaced { evicted, by } => {
            state.waiting.retain(|r| r.id != evicted.id);
            insert_waiting(&mut state.waiting, by);
            state.stats.rejected += 1;
            state.stats.displaced += 1;
            add_log(
                &mut state.logs,
                format!("{} displaced by {}", evicted.get_name(), by.get_name()),
            );
        }
        SystemEvent::RequestRejected(request) => {
            state.stats.rejected += 1;
            add_log(&mut state.logs, format!("{} rejected", request.get_name()));
        }
        SystemEvent::RequestProcessed {
            request,
            time,
            waiting_time,
        } => {
            if state.in_service.is_some_and(|(r, _)| r.id == request.id) {
                state.in_service = None;
            }
            state.stats.processed += 1;
            state.stats.total_waiting += waiting_time;
            add_log(
                &mut state.logs,
                format!(
                    "t={time:.3} {} processed after {waiting_time:.3}s",
                    request.get_name()
                ),
            );
        }
        SystemEvent::OccupancySampled(OccupancySample { time, queue_len }) => {
            state.occupancy.push((time, queue_len as f64));
        }
    }
}

fn insert_waiting(waiting: &mut Vec<Request>, request: Request) {
    waiting.push(request);
    waiting.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
}

fn add_log(logs: &mut Vec<String>, message: String) {
    if logs.len() >= LOG_CAPACITY {
        logs.remove(0);
    };

    logs.push(format!(
        "[{}] {}",
        chrono::Local::now().format("%H:%M:%S"),
        message
    ));
}

fn render_system_ui(frame: &mut Frame, state: &DisplayState) {
    let main_layout = Layout::horizontal([Constraint::Percentage(70), Constraint::Percentage(30)])
        .areas(frame.area());
    let [processing_area, info_area] = main_layout;

    let processing_layout =
        Layout::vertical([Constraint::Percentage(60), Constraint::Percentage(40)])
            .areas(processing_area);
    let [chart_area, system_area] = processing_layout;

    let system_layout =
        Layout::horizontal([Constraint::Percentage(70), Constraint::Percentage(30)])
            .areas(system_area);
    let [queue_area, server_area] = system_layout;

    let info_layout =
        Layout::vertical([Constraint::Percentage(30), Constraint::Percentage(70)]).areas(info_area);
    let [stats_area, logs_area] = info_layout;

    render_occupancy(frame, chart_area, state);
    render_queue(frame, queue_area, state);
    render_server(frame, server_area, state);
    render_stats(frame, stats_area, state);
    render_logs(frame, logs_area, &state.logs);
}

fn render_occupancy(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let start = state.occupancy.first().map_or(0.0, |(t, _)| *t);
    let end = state.occupancy.last().map_or(1.0, |(t, _)| *t).max(start + f64::EPSILON);
    let top = state.capacity.max(1) as f64;

    let dataset = Dataset::default()
        .name("queue length")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(style::Color::Cyan))
        .data(&state.occupancy);

    let chart = Chart::new(vec![dataset])
        .block(Block::bordered().title("Queue occupancy"))
        .x_axis(
            Axis::default()
                .title("time (s)")
                .bounds([start, end])
                .labels([format!("{start:.1}"), format!("{end:.1}")]),
        )
        .y_axis(
            Axis::default()
                .title("waiting")
                .bounds([0.0, top])
                .labels(["0".to_string(), format!("{top:.0}")]),
        );

    frame.render_widget(chart, area);
}

fn render_queue(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let style = if state.waiting.len() >= state.capacity {
        Style::default().fg(style::Color::Red)
    } else {
        Style::default()
    };
    let block = Block::bordered()
        .title(format!("Queue ({}/{})", state.waiting.len(), state.capacity))
        .style(style);
    let inner_area = block.inner(area);

    frame.render_widget(block, area);

    if state.waiting.is_empty() {
        return;
    }

    let req_width = 14;
    let slots = (inner_area.width as usize / req_width).max(1);
    let constraints = vec![Constraint::Length(req_width as u16); slots];
    let cells = Layout::horizontal(constraints).split(inner_area);

    for (idx, request) in state.waiting.iter().take(slots).enumerate() {
        let req_text = Paragraph::new(format!("{}\n(#{})", request.priority, request.id))
            .alignment(layout::Alignment::Center)
            .block(Block::bordered().style(first_req_style(idx)));
        frame.render_widget(req_text, cells[idx]);
    }
}

fn render_server(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let block = Block::bordered().title("Server");
    let body = match state.in_service {
        Some((request, completion_time)) => format!(
            "{}\narrived {:.3}\ndone at {:.3}",
            request.get_name(),
            request.arrival_time,
            completion_time
        ),
        None => "idle".to_string(),
    };
    let paragraph = Paragraph::new(body)
        .alignment(layout::Alignment::Center)
        .style(first_req_style(if state.in_service.is_some() { 0 } else { 1 }))
        .block(block);

    frame.render_widget(paragraph, area);
}

fn first_req_style(idx: usize) -> Style {
    if idx == 0 {
        Style::default().fg(style::Color::Green)
    } else {
        Style::default()
    }
}

fn render_stats(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let title = if state.finished {
        "Statistics (finished)"
    } else {
        "Statistics"
    };
    let block = Block::bordered().title(title);
    let inner_area = block.inner(area);

    frame.render_widget(block, area);

    let stats = &state.stats;
    let stats_text = text::Text::from(vec![
        text::Line::from(format!("Time: {:.3}s", state.now)),
        text::Line::from(format!("Arrivals: {}", stats.arrivals)),
        text::Line::from(format!("Processed: {}", stats.processed)),
        text::Line::from(format!(
            "Rejected: {} ({} displaced)",
            stats.rejected, stats.displaced
        )),
        text::Line::from(format!("Average Wait: {:.4}s", stats.mean_waiting())),
    ]);

    let stats_widget = Paragraph::new(stats_text);
    frame.render_widget(stats_widget, inner_area);
}

fn render_logs(frame: &mut Frame, area: Rect, logs: &[String]) {
    let block = Block::bordered().title("Event Log");
    let inner_area = block.inner(area);

    frame.render_widget(block, area);

    if !logs.is_empty() {
        let items: Vec<ListItem> = logs
            .iter()
            .map(|log| ListItem::new(text::Line::from(log.clone())))
            .rev()
            .collect();

        let max_scroll = items.len().saturating_sub(1);
        let current_log = SELECTED_LOG.load(Ordering::SeqCst);
        SELECTED_LOG.store(current_log.min(max_scroll), Ordering::SeqCst);

        let logs_list = List::new(items)
            .block(Block::default())
            .highlight_style(Style::default().add_modifier(style::Modifier::REVERSED));

        let mut state = ListState::default();
        state.select(Some(SELECTED_LOG.load(Ordering::SeqCst)));

        frame.render_stateful_widget(logs_list, inner_area, &mut state);
    }
}

fn handle_events() -> io::Result<bool> {
    if event::poll(Duration::from_millis(10))? {
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if key.code == KeyCode::Char('q') {
                    return Ok(true);
                }
            }
            Event::Mouse(mouse) => {
                let current = SELECTED_LOG.load(Ordering::SeqCst);
                match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        SELECTED_LOG.store(current.saturating_add(1), Ordering::SeqCst)
                    }
                    MouseEventKind::ScrollDown => {
                        SELECTED_LOG.store(current.saturating_sub(1), Ordering::SeqCst)
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(false)
}
