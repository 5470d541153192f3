// The live dashboard: event loop, modes and overlays.

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{Terminal, backend::Backend};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod ui;
pub mod view;
pub mod worker;

use crate::manager::{ServiceAction, ServiceManager};
use view::ServiceTable;
use worker::{AppEvent, Worker};

/// Longest time the loop waits for input before draining background results.
const INPUT_POLL: Duration = Duration::from_millis(100);

/// How long shutdown waits for in-flight actions before closing the session.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct DashboardOptions {
    pub refresh_interval: Duration,
    pub log_lines: usize,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(2),
            log_lines: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    FilterEdit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogView {
    pub unit: String,
    /// `None` until the fetch completes.
    pub text: Option<String>,
    pub scroll: u16,
    pub stick_to_bottom: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    Progress { action: ServiceAction, unit: String },
    Error { message: String },
    Logs(LogView),
}

pub struct App {
    manager: Arc<ServiceManager>,
    worker: Worker,
    events: Receiver<AppEvent>,
    table: ServiceTable,
    mode: Mode,
    overlay: Option<Overlay>,
    options: DashboardOptions,
    should_quit: bool,
}

impl App {
    pub fn new(manager: Arc<ServiceManager>, options: DashboardOptions) -> Self {
        let (tx, events) = unbounded();
        Self {
            worker: Worker::new(Arc::clone(&manager), tx),
            manager,
            events,
            table: ServiceTable::new(),
            mode: Mode::Browse,
            overlay: None,
            options,
            should_quit: false,
        }
    }

    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        // Initial fetch
        self.load();

        let mut last_tick = Instant::now();
        let tick_rate = self.options.refresh_interval;

        loop {
            terminal.draw(|f| ui::render(f, self))?;

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or(Duration::ZERO)
                .min(INPUT_POLL);

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(key);
                }
            }

            self.drain_events();

            if last_tick.elapsed() >= tick_rate {
                self.worker.poll();
                last_tick = Instant::now();
            }

            if self.should_quit {
                break;
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Stops the engine and closes the session.
    ///
    /// Background tasks get `SHUTDOWN_GRACE` to finish first; anything still
    /// running after that sees a closed session.
    pub fn shutdown(&mut self) {
        self.should_quit = true;
        if !self.worker.wait_idle(SHUTDOWN_GRACE) {
            log::warn!(
                "closing with {} background task(s) still running",
                self.worker.in_flight()
            );
        }
        self.manager.close();
    }

    /// Synchronous fetch; a failure leaves the table as it was.
    pub fn load(&mut self) {
        match self.manager.list_services() {
            Ok(units) => self.table.replace_units(units),
            Err(e) => log::warn!("initial service listing failed: {}", e),
        }
    }

    pub fn table(&self) -> &ServiceTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ServiceTable {
        &mut self.table
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn overlay_mut(&mut self) -> Option<&mut Overlay> {
        self.overlay.as_mut()
    }

    pub fn scope(&self) -> crate::manager::Scope {
        self.manager.scope()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Applies every background result that has already arrived.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
    }

    /// Waits up to `timeout` for one background result and applies it.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.apply(event);
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::Refreshed(Ok(units)) => self.table.replace_units(units),
            AppEvent::Refreshed(Err(e)) => {
                // Keep showing the last good list; the next tick retries.
                log::debug!("poll failed: {}", e);
            }
            AppEvent::ActionFinished {
                action,
                unit,
                result,
            } => match result {
                Ok(()) => {
                    log::info!("{} {}", unit, action.past());
                    let waiting = Some(Overlay::Progress {
                        action,
                        unit: unit.clone(),
                    });
                    if self.overlay == waiting {
                        self.overlay = None;
                    }
                    self.worker.refresh();
                }
                Err(e) => {
                    self.overlay = Some(Overlay::Error {
                        message: format!("Error: {e}"),
                    });
                }
            },
            AppEvent::LogsFetched { unit, result } => {
                if let Some(Overlay::Logs(view)) = self.overlay.as_mut() {
                    if view.unit == unit && view.text.is_none() {
                        view.text = Some(match result {
                            Ok(text) => text,
                            Err(e) => format!("Error fetching logs: {e}"),
                        });
                        view.stick_to_bottom = true;
                    }
                }
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.overlay.is_some() {
            self.handle_overlay_key(key.code);
            return;
        }

        match self.mode {
            Mode::Browse => self.handle_browse_key(key.code),
            Mode::FilterEdit => self.handle_filter_key(key.code),
        }
    }

    fn handle_overlay_key(&mut self, code: KeyCode) {
        let dismiss = match self.overlay.as_mut() {
            // Hiding the progress box does not cancel the action.
            Some(Overlay::Progress { .. }) => code == KeyCode::Esc,
            Some(Overlay::Error { .. }) => {
                matches!(code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q'))
            }
            Some(Overlay::Logs(view)) => match code {
                KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('l') => true,
                KeyCode::Char('j') | KeyCode::Down => {
                    view.stick_to_bottom = false;
                    view.scroll = view.scroll.saturating_add(1);
                    false
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    view.stick_to_bottom = false;
                    view.scroll = view.scroll.saturating_sub(1);
                    false
                }
                KeyCode::Char('G') => {
                    view.stick_to_bottom = true;
                    false
                }
                _ => false,
            },
            None => false,
        };
        if dismiss {
            self.overlay = None;
        }
    }

    fn handle_browse_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.table.next(),
            KeyCode::Char('k') | KeyCode::Up => self.table.previous(),

            KeyCode::Char('s') => self.perform_action(ServiceAction::Start),
            KeyCode::Char('x') => self.perform_action(ServiceAction::Stop),
            KeyCode::Char('r') => self.perform_action(ServiceAction::Restart),

            KeyCode::Char('l') | KeyCode::Enter => self.show_logs(),
            KeyCode::Char('/') => self.mode = Mode::FilterEdit,
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => self.mode = Mode::Browse,
            KeyCode::Esc => {
                self.mode = Mode::Browse;
                self.table.set_filter("");
                self.worker.refresh();
            }
            KeyCode::Backspace => {
                self.table.pop_filter_char();
                self.worker.refresh();
            }
            KeyCode::Char(c) => {
                self.table.push_filter_char(c);
                self.worker.refresh();
            }
            _ => {}
        }
    }

    fn perform_action(&mut self, action: ServiceAction) {
        if let Some(service) = self.table.selected() {
            let unit = service.name.clone();
            self.overlay = Some(Overlay::Progress {
                action,
                unit: unit.clone(),
            });
            self.worker.run_action(action, unit);
        }
    }

    fn show_logs(&mut self) {
        if let Some(service) = self.table.selected() {
            let unit = service.name.clone();
            self.overlay = Some(Overlay::Logs(LogView {
                unit: unit.clone(),
                text: None,
                scroll: 0,
                stick_to_bottom: true,
            }));
            self.worker.fetch_logs(unit, self.options.log_lines);
        }
    }
}
