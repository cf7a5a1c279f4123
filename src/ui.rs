use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use permit_queue::{
    KioskEvent, KioskState, PermitRecord, QueueError, QueueNumber, QueueService, Resolution,
    ScanBuffer, ScanKey,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    ScanQueue,
    PrintPermit,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::ScanQueue => Page::PrintPermit,
            Page::PrintPermit => Page::ScanQueue,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::ScanQueue => "Get Queue",
            Page::PrintPermit => "Print Permit",
        }
    }
}

pub struct App {
    service: Arc<QueueService>,
    runtime: Handle,
    pub current_page: Page,

    // Scan-and-queue page
    pub scan: ScanBuffer,
    pub kiosk: KioskState,

    // Print-permit page
    pub permit_input: ScanBuffer,
    pub permit: Option<(QueueNumber, PermitRecord)>,
    pub permit_error: Option<String>,
}

impl App {
    pub fn new(service: Arc<QueueService>, runtime: Handle) -> Self {
        Self {
            service,
            runtime,
            current_page: Page::ScanQueue,
            scan: ScanBuffer::new(),
            kiosk: KioskState::Idle,
            permit_input: ScanBuffer::new(),
            permit: None,
            permit_error: None,
        }
    }

    /// Route one key press. Returns true when the kiosk should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
        {
            return true;
        }

        match key.code {
            KeyCode::Tab | KeyCode::BackTab => self.current_page = self.current_page.next(),
            KeyCode::Esc => match self.current_page {
                Page::ScanQueue => self.dismiss(),
                Page::PrintPermit => self.close_permit(),
            },
            KeyCode::Enter => self.on_scan_key(ScanKey::Enter),
            KeyCode::Backspace => self.on_scan_key(ScanKey::Backspace),
            KeyCode::Char(c) => self.on_scan_key(ScanKey::Char(c)),
            _ => {}
        }
        false
    }

    fn on_scan_key(&mut self, key: ScanKey) {
        match self.current_page {
            Page::ScanQueue => self.on_queue_key(key),
            Page::PrintPermit => self.on_permit_key(key),
        }
    }

    // ========================================================================
    // SCAN AND QUEUE
    // ========================================================================

    fn on_queue_key(&mut self, key: ScanKey) {
        if let ScanKey::Char(c) = key {
            self.transition(KioskEvent::Input(c));
        }
        if key == ScanKey::Backspace {
            if let KioskState::Scanning { buffer } = &mut self.kiosk {
                buffer.pop();
            }
        }

        if let Some(token) = self.scan.push(key) {
            self.submit_scan(&token);
        }
    }

    /// Resolve the scanned token and, if it names an account, issue a number.
    pub fn submit_scan(&mut self, token: &str) {
        let service = Arc::clone(&self.service);

        let resolution = match self.runtime.block_on(service.resolve_identity(token)) {
            Ok(resolution) => resolution,
            Err(e) => return self.fail(e),
        };
        self.transition(KioskEvent::ScanComplete(resolution.clone()));

        let Resolution::Found(identity) = resolution else {
            return;
        };

        let kiosk = &mut self.kiosk;
        let issued = self.runtime.block_on(service.issue_claim_with(identity, |number| {
            *kiosk = std::mem::take(kiosk).on(KioskEvent::SaveStarted(number));
        }));

        match issued {
            Ok(entry) => self.transition(KioskEvent::SaveSucceeded(entry)),
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, err: QueueError) {
        tracing::warn!(kind = err.kind(), error = %err, "kiosk operation failed");
        let event = match &err {
            QueueError::Timeout { .. } => KioskEvent::Timeout,
            QueueError::DuplicateQueueNumber(_) => {
                KioskEvent::SaveFailed("That queue number was just taken. Please scan again.".to_string())
            }
            _ => KioskEvent::SaveFailed(err.to_string()),
        };
        self.transition(event);
    }

    fn transition(&mut self, event: KioskEvent) {
        let state = std::mem::take(&mut self.kiosk);
        self.kiosk = state.on(event);
    }

    fn dismiss(&mut self) {
        self.scan.clear();
        if matches!(self.kiosk, KioskState::Scanning { .. }) {
            self.kiosk = KioskState::Idle;
        } else {
            self.transition(KioskEvent::Dismiss);
        }
    }

    // ========================================================================
    // PRINT PERMIT
    // ========================================================================

    fn on_permit_key(&mut self, key: ScanKey) {
        if key == ScanKey::Enter && self.permit_input.is_empty() {
            self.permit_error = Some("Queue number is required.".to_string());
            return;
        }
        if let Some(token) = self.permit_input.push(key) {
            self.fetch_permit(&token);
        }
    }

    pub fn fetch_permit(&mut self, token: &str) {
        let number = match QueueNumber::parse(token) {
            Ok(number) => number,
            Err(e) => {
                self.permit = None;
                self.permit_error = Some(e.to_string());
                return;
            }
        };

        match self.runtime.block_on(self.service.fetch_permit(number)) {
            Ok(permit) => {
                self.permit = Some((number, permit));
                self.permit_error = None;
            }
            Err(QueueError::NotFound(_)) => {
                self.permit = None;
                self.permit_error = Some("No permit found for this queue number.".to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "permit lookup failed");
                self.permit_error = Some("Error fetching data.".to_string());
            }
        }
    }

    fn close_permit(&mut self) {
        self.permit_input.clear();
        self.permit = None;
        self.permit_error = None;
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::ScanQueue => render_scan_queue(f, chunks[1], app),
        Page::PrintPermit => render_print_permit(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::ScanQueue, Page::PrintPermit];

    let mut tab_spans = vec![Span::styled(
        " Universidad de Zamboanga ",
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    )];
    for page in pages {
        tab_spans.push(Span::raw(" │ "));
        let style = if page == app.current_page {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        tab_spans.push(Span::styled(format!(" {} ", page.title()), style));
    }

    let header = Paragraph::new(Line::from(tab_spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn input_box<'a>(title: &'a str, value: &str) -> Paragraph<'a> {
    Paragraph::new(Line::from(vec![
        Span::styled(value.to_string(), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled("▏", Style::default().fg(Color::DarkGray)),
    ]))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title(title),
    )
}

fn render_scan_queue(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    f.render_widget(input_box(" Scanned Data ", app.scan.as_str()), chunks[0]);

    let (color, lines) = match &app.kiosk {
        KioskState::Idle => (Color::Gray, vec![Line::from("Scan a student QR code or barcode.")]),
        KioskState::Scanning { .. } => (Color::Yellow, vec![Line::from("Scanning...")]),
        KioskState::Resolved { identity } => (
            Color::Cyan,
            vec![Line::from(format!("Found {} ({})", identity.name, identity.student_number))],
        ),
        KioskState::Saving { identity, queue_number } => (
            Color::Cyan,
            vec![Line::from(format!("Saving {} for {}...", queue_number, identity.name))],
        ),
        KioskState::Success { entry } => (
            Color::Green,
            vec![
                Line::from("Your queue number"),
                Line::from(""),
                Line::from(Span::styled(
                    entry.queue_number.to_string(),
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!("{}  ·  {}", entry.user_name, entry.user_student_number)),
                Line::from(entry.user_email.clone()),
                Line::from(entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            ],
        ),
        KioskState::Error { message } => (
            Color::Red,
            vec![Line::from("Error:"), Line::from(message.clone())],
        ),
    };

    let status = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(format!(" {} ", app.kiosk.label())),
        );
    f.render_widget(status, chunks[1]);
}

fn render_print_permit(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    f.render_widget(
        input_box(" Enter Queue Number ", app.permit_input.as_str()),
        chunks[0],
    );

    if let Some(message) = &app.permit_error {
        let error = Paragraph::new(vec![Line::from("Error:"), Line::from(message.clone())])
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Red)));
        f.render_widget(error, chunks[1]);
    }

    if let Some((number, permit)) = &app.permit {
        render_permit_modal(f, chunks[1], *number, permit);
    }
}

fn render_permit_modal(f: &mut Frame, area: Rect, number: QueueNumber, permit: &PermitRecord) {
    let popup = centered_rect(60, 12, area);

    let mut lines = vec![
        Line::from(Span::styled(
            format!("Permit Details · {}", number),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for (label, value) in permit.detail_lines() {
        lines.push(Line::from(vec![
            Span::styled(format!("{}: ", label), Style::default().fg(Color::Yellow)),
            Span::raw(value),
        ]));
    }

    let modal = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title(" User Information "),
    );

    f.render_widget(Clear, popup);
    f.render_widget(modal, popup);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let action = match app.current_page {
        Page::ScanQueue => " Submit scan | ",
        Page::PrintPermit => " Fetch permit | ",
    };

    let status_spans = vec![
        Span::styled(" Enter", Style::default().fg(Color::Yellow)),
        Span::raw(action),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" Close | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("Ctrl+Q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}
