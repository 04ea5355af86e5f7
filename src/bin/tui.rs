//! RU Monitor kiosk - terminal front end for a single visitor
//!
//! Shows the live queue status card and drives one visitor through the
//! cashier and turnstile queues:
//! - Space/Enter: next step
//! - c: cancel the current visit
//! - r: refresh the status card
//! - h (or click the header): admin tap, five taps open the admin panel
//! - x: close the admin panel
//! - q/Esc: quit
//!
//! Logs go to a file so the terminal stays clean.

use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use ru_monitor::domain::{QueueStatus, Stage, VisitorFlowState};
use ru_monitor::infra::{Config, Metrics};
use ru_monitor::io::{event_sink_from_config, stats_source_from_config};
use ru_monitor::services::{
    create_event_worker, create_refresh_loop, AdminUnlock, BoardState, DisplayTicker,
    RefreshHandle, Tracker, Transition,
};
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const HEADER_HEIGHT: u16 = 3;
const NOTICE_TTL: Duration = Duration::from_secs(4);

/// RU Monitor kiosk
#[derive(Parser, Debug)]
#[command(name = "ru-monitor-tui", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log file
    #[arg(long, default_value = "ru-monitor-tui.log")]
    log_file: String,
}

/// Everything the UI task owns
struct Kiosk {
    site_name: String,
    tracker: Tracker,
    ticker: DisplayTicker,
    elapsed_secs: u64,
    admin: AdminUnlock,
    refresh: RefreshHandle,
    board_rx: watch::Receiver<BoardState>,
    metrics: Arc<Metrics>,
    max_valid_minutes: f64,
    notice: Option<(String, Instant)>,
}

/// Notice for a closed leg; only claims the time was recorded if the worker will keep it
fn leg_notice(transition: &Transition, max_valid_minutes: f64) -> Option<String> {
    let event = transition.event.as_ref()?;
    let leg = match event.stage {
        Stage::Cashier => "caixa",
        Stage::Access => "catraca",
    };
    let text = if !transition.queued {
        format!("Tempo não enviado ({leg}): sistema ocupado")
    } else if !event.is_plausible(max_valid_minutes) {
        format!("Tempo descartado ({leg}): {:.1} min fora do limite", event.duration_minutes)
    } else {
        format!("Tempo registrado ({leg}): {:.1} min", event.duration_minutes)
    };
    Some(text)
}

impl Kiosk {
    fn advance(&mut self) {
        let transition = self.tracker.advance();
        self.on_transition(&transition);
    }

    fn cancel(&mut self) {
        if let Some(transition) = self.tracker.cancel() {
            self.on_transition(&transition);
            self.notice = Some(("Marcação cancelada.".to_string(), Instant::now()));
        }
    }

    fn on_transition(&mut self, transition: &Transition) {
        if let Some(text) = leg_notice(transition, self.max_valid_minutes) {
            self.notice = Some((text, Instant::now()));
        }
        if !transition.to.is_timed() {
            self.ticker.disarm();
            self.elapsed_secs = 0;
        }
    }

    fn header_tap(&mut self) {
        self.admin.click();
    }

    /// Advance the one-second elapsed display and expire notices
    fn tick(&mut self, now: Instant) {
        if let Some(secs) = self.ticker.poll(self.tracker.started_at(), now) {
            self.elapsed_secs = secs;
        }
        if let Some((_, at)) = &self.notice {
            if now.saturating_duration_since(*at) >= NOTICE_TTL {
                self.notice = None;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_file = OpenOptions::new().create(true).append(true).open(&args.log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "ru_monitor_tui_starting");

    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);
    info!(
        config_file = %config.config_file(),
        stats_mode = ?config.stats_mode(),
        sink = ?config.sink_mode(),
        refresh_interval_ms = %config.refresh_interval_ms(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let sink = event_sink_from_config(&config)?;
    let (event_tx, worker) = create_event_worker(
        sink,
        metrics.clone(),
        config.events_channel_capacity(),
        config.max_valid_wait_minutes(),
    );
    let worker_handle = tokio::spawn(worker.run());

    let (tracker, visitor_rx) = Tracker::new(event_tx, metrics.clone());
    let source = stats_source_from_config(&config)?;
    let (refresh, refresh_loop, board_rx) = create_refresh_loop(
        source,
        visitor_rx,
        Duration::from_millis(config.refresh_interval_ms()),
        metrics.clone(),
    );
    let refresh_handle = tokio::spawn(refresh_loop.run(shutdown_rx));

    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    let reporter_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let mut kiosk = Kiosk {
        site_name: config.site_name().to_string(),
        tracker,
        ticker: DisplayTicker::new(),
        elapsed_secs: 0,
        admin: AdminUnlock::new(),
        refresh,
        board_rx,
        metrics,
        max_valid_minutes: config.max_valid_wait_minutes(),
        notice: None,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, &mut kiosk);

    let _ = shutdown_tx.send(true);
    reporter_handle.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Dropping the tracker closes the event channel; give the worker a moment to drain
    drop(kiosk);
    if tokio::time::timeout(Duration::from_secs(1), refresh_handle).await.is_err() {
        info!("refresh_loop_stop_timeout");
    }
    if tokio::time::timeout(Duration::from_secs(2), worker_handle).await.is_err() {
        info!("queue_event_worker_drain_timeout");
    }
    info!("ru-monitor-tui shutdown complete");

    result
}

fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    kiosk: &mut Kiosk,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        kiosk.tick(Instant::now());
        let board = kiosk.board_rx.borrow().clone();
        terminal.draw(|f| draw_ui(f, kiosk, &board))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char(' ') | KeyCode::Enter => kiosk.advance(),
                    KeyCode::Char('c') => kiosk.cancel(),
                    KeyCode::Char('r') => kiosk.refresh.request(),
                    KeyCode::Char('h') => kiosk.header_tap(),
                    KeyCode::Char('x') => kiosk.admin.close(),
                    _ => {}
                },
                Event::Mouse(mouse)
                    if mouse.kind == MouseEventKind::Down(MouseButton::Left)
                        && mouse.row < HEADER_HEIGHT =>
                {
                    kiosk.header_tap();
                }
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn status_color(status: QueueStatus) -> Color {
    match status {
        QueueStatus::Green => Color::Green,
        QueueStatus::Yellow => Color::Yellow,
        QueueStatus::Red => Color::Red,
        QueueStatus::Unknown => Color::Gray,
    }
}

fn draw_ui(f: &mut Frame, kiosk: &Kiosk, board: &BoardState) {
    let admin_height = if kiosk.admin.is_unlocked() { 8 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Length(admin_height),
            Constraint::Length(8), // Status card
            Constraint::Length(7), // Action
            Constraint::Min(0),
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], kiosk);
    if kiosk.admin.is_unlocked() {
        draw_admin_panel(f, chunks[1], kiosk);
    }
    draw_status_card(f, chunks[2], board);
    draw_action(f, chunks[3], kiosk);
    draw_footer(f, chunks[5], kiosk);
}

fn draw_header(f: &mut Frame, area: Rect, kiosk: &Kiosk) {
    let now =
        time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let clock = now
        .format(time::macros::format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{} ", kiosk.site_name),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::styled("• Colaborativo ", Style::default().fg(Color::Cyan)),
        Span::raw("| "),
        Span::styled("AO VIVO", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" | {clock}")),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Blue)));

    f.render_widget(header, area);
}

fn draw_admin_panel(f: &mut Frame, area: Rect, kiosk: &Kiosk) {
    let m = &kiosk.metrics;
    let lines = vec![
        Line::from(format!(
            "Legs:      caixa {}  catraca {}",
            m.legs_timed(Stage::Cashier),
            m.legs_timed(Stage::Access)
        )),
        Line::from(format!("Cancelados: {}", m.cancellations_total())),
        Line::from(format!(
            "Eventos:   enviados {}  falhas {}  perdidos {}  descartados {}",
            m.events_submitted(),
            m.events_submit_failed(),
            m.events_dropped(),
            m.events_discarded()
        )),
        Line::from(format!(
            "Refresh:   falhas {}  suprimidos {}",
            m.stats_fetch_failures(),
            m.refresh_suppressed_total()
        )),
        Line::from(format!("Sessão:    {}", kiosk.tracker.session_id())),
        Line::from(Span::styled("[x] Fechar", Style::default().fg(Color::DarkGray))),
    ];

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Modo Admin ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(panel, area);
}

fn draw_status_card(f: &mut Frame, area: Rect, board: &BoardState) {
    let Some(snapshot) = &board.snapshot else {
        let text = if board.loading {
            "Carregando dados...".to_string()
        } else {
            board.last_error.clone().unwrap_or_else(|| "Sem dados.".to_string())
        };
        let card = Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(card, area);
        return;
    };

    let color = status_color(snapshot.status);
    let copy = snapshot.status.copy();
    let total = snapshot
        .display_total_minutes()
        .map(|m| format!("{m} min"))
        .unwrap_or_else(|| "--".to_string());

    let mut lines = vec![
        Line::from(Span::styled(copy.text, Style::default().fg(color).add_modifier(Modifier::BOLD))),
        Line::from(Span::styled(copy.subtext, Style::default().fg(color))),
        Line::from(""),
        Line::from(vec![
            Span::raw("Espera Total: "),
            Span::styled(total, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("   Online: "),
            Span::styled(
                snapshot.active_contributors.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
    ];
    if board.last_error.is_some() {
        lines.push(Line::from(Span::styled(
            "Falha ao atualizar, exibindo último dado.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let title = if board.loading { " Status (atualizando...) " } else { " Status " };
    let card = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default().title(title).borders(Borders::ALL).border_style(Style::default().fg(color)),
    );
    f.render_widget(card, area);
}

fn draw_action(f: &mut Frame, area: Rect, kiosk: &Kiosk) {
    let state = kiosk.tracker.state();
    let copy = state.action_copy(kiosk.elapsed_secs);
    let color = match state {
        VisitorFlowState::InCashierQueue => Color::Red,
        VisitorFlowState::InAccessQueue => Color::Green,
        VisitorFlowState::Completed => Color::Gray,
        VisitorFlowState::Idle | VisitorFlowState::BetweenQueues => Color::Blue,
    };

    let mut lines = vec![
        Line::from(Span::styled(
            format!("[Espaço] {}", copy.text),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(copy.sub),
    ];
    if state.is_cancellable() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "[c] Cancelar marcação",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let action = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .title(" Sua contribuição ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color)),
    );
    f.render_widget(action, area);
}

fn draw_footer(f: &mut Frame, area: Rect, kiosk: &Kiosk) {
    let line = match &kiosk.notice {
        Some((text, _)) => Line::from(Span::styled(text.clone(), Style::default().fg(Color::Green))),
        None => Line::from(Span::styled(
            "[r] atualizar  [q] sair",
            Style::default().fg(Color::DarkGray),
        )),
    };
    let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}
