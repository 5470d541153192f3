mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBackend, unit};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{Terminal, backend::TestBackend};
use svcm::app::worker::AppEvent;
use svcm::app::{App, DashboardOptions, Mode, Overlay, ui};
use svcm::manager::{ServiceAction, ServiceError};

const WAIT: Duration = Duration::from_secs(5);

fn setup() -> (FakeBackend, App) {
    let fake = FakeBackend::with_units(vec![
        unit("alpha.service", "active", "running"),
        unit("bravo.service", "inactive", "dead"),
        unit("charlie.service", "failed", "failed"),
    ]);
    let mut app = App::new(Arc::new(fake.manager()), DashboardOptions::default());
    app.load();
    (fake, app)
}

fn press(app: &mut App, code: KeyCode) {
    app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
}

fn selected_name(app: &App) -> Option<String> {
    app.table().selected().map(|unit| unit.name.clone())
}

#[test]
fn initial_load_selects_first_row() {
    let (_fake, app) = setup();
    assert_eq!(app.table().rows().len(), 3);
    assert_eq!(selected_name(&app).as_deref(), Some("alpha.service"));
    assert_eq!(app.mode(), Mode::Browse);
    assert!(app.overlay().is_none());
}

#[test]
fn successful_action_clears_progress_and_refreshes() {
    let (fake, mut app) = setup();
    press(&mut app, KeyCode::Char('j'));
    press(&mut app, KeyCode::Char('s'));
    assert_eq!(
        app.overlay(),
        Some(&Overlay::Progress {
            action: ServiceAction::Start,
            unit: "bravo.service".into(),
        })
    );

    assert!(app.pump(WAIT));
    assert!(app.overlay().is_none());

    assert!(app.pump(WAIT));
    let bravo = &app.table().rows()[1];
    assert_eq!(bravo.active_state, "active");
    assert_eq!(selected_name(&app).as_deref(), Some("bravo.service"));
    assert!(fake.state().calls.contains(&"start bravo.service".to_string()));
}

#[test]
fn failed_action_shows_error_until_dismissed() {
    let (fake, mut app) = setup();
    fake.state().reject_actions = true;

    press(&mut app, KeyCode::Char('x'));
    assert!(app.pump(WAIT));
    match app.overlay() {
        Some(Overlay::Error { message }) => {
            assert!(message.starts_with("Error: "));
            assert!(message.contains("alpha.service"));
        }
        other => panic!("expected error overlay, got {other:?}"),
    }

    // Navigation keys do not leak through the overlay.
    press(&mut app, KeyCode::Char('j'));
    assert_eq!(selected_name(&app).as_deref(), Some("alpha.service"));

    press(&mut app, KeyCode::Enter);
    assert!(app.overlay().is_none());
    assert_eq!(app.mode(), Mode::Browse);
}

#[test]
fn hidden_progress_still_reports_failure() {
    let (fake, mut app) = setup();
    fake.state().reject_actions = true;

    press(&mut app, KeyCode::Char('r'));
    press(&mut app, KeyCode::Esc);
    assert!(app.overlay().is_none());

    assert!(app.pump(WAIT));
    assert!(matches!(app.overlay(), Some(Overlay::Error { .. })));
}

#[test]
fn failed_poll_keeps_previous_rows() {
    let (_fake, mut app) = setup();
    app.apply(AppEvent::Refreshed(Err(ServiceError::QueryFailed(
        "bus timeout".into(),
    ))));
    assert_eq!(app.table().rows().len(), 3);
    assert!(app.overlay().is_none());
}

#[test]
fn refresh_keeps_selection_on_the_same_unit() {
    let (_fake, mut app) = setup();
    press(&mut app, KeyCode::Char('j'));
    assert_eq!(selected_name(&app).as_deref(), Some("bravo.service"));

    app.apply(AppEvent::Refreshed(Ok(vec![
        unit("bravo.service", "active", "running"),
        unit("charlie.service", "failed", "failed"),
    ])));
    assert_eq!(app.table().selected_index(), Some(0));
    assert_eq!(selected_name(&app).as_deref(), Some("bravo.service"));
}

#[test]
fn filter_edit_narrows_and_escape_clears() {
    let (_fake, mut app) = setup();
    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.mode(), Mode::FilterEdit);

    press(&mut app, KeyCode::Char('r'));
    press(&mut app, KeyCode::Char('a'));
    assert_eq!(app.table().filter(), "ra");
    assert_eq!(selected_name(&app).as_deref(), Some("bravo.service"));
    assert_eq!(app.table().rows().len(), 1);
    // Typing in the filter never triggers actions.
    assert!(app.overlay().is_none());

    press(&mut app, KeyCode::Backspace);
    assert_eq!(app.table().filter(), "r");

    press(&mut app, KeyCode::Esc);
    assert_eq!(app.mode(), Mode::Browse);
    assert_eq!(app.table().filter(), "");
    assert_eq!(app.table().rows().len(), 3);
}

#[test]
fn filter_enter_keeps_the_filter() {
    let (_fake, mut app) = setup();
    press(&mut app, KeyCode::Char('/'));
    press(&mut app, KeyCode::Char('c'));
    press(&mut app, KeyCode::Char('h'));
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.mode(), Mode::Browse);
    assert_eq!(app.table().filter(), "ch");
    assert_eq!(selected_name(&app).as_deref(), Some("charlie.service"));
    assert_eq!(app.table().rows().len(), 1);
}

#[test]
fn logs_overlay_fills_in_when_fetched() {
    let (fake, mut app) = setup();
    fake.state().logs = "first\nsecond\n".into();

    press(&mut app, KeyCode::Char('l'));
    match app.overlay() {
        Some(Overlay::Logs(view)) => {
            assert_eq!(view.unit, "alpha.service");
            assert!(view.text.is_none());
        }
        other => panic!("expected logs overlay, got {other:?}"),
    }

    assert!(app.pump(WAIT));
    match app.overlay() {
        Some(Overlay::Logs(view)) => {
            assert_eq!(view.text.as_deref(), Some("first\nsecond\n"));
            assert!(view.stick_to_bottom);
        }
        other => panic!("expected logs overlay, got {other:?}"),
    }
    assert!(fake.state().calls.contains(&"logs alpha.service 200".to_string()));

    press(&mut app, KeyCode::Char('k'));
    assert!(matches!(app.overlay(), Some(Overlay::Logs(view)) if !view.stick_to_bottom));
    press(&mut app, KeyCode::Char('G'));
    assert!(matches!(app.overlay(), Some(Overlay::Logs(view)) if view.stick_to_bottom));

    press(&mut app, KeyCode::Esc);
    assert!(app.overlay().is_none());
}

#[test]
fn quit_keys() {
    let (_fake, mut app) = setup();
    press(&mut app, KeyCode::Char('q'));
    assert!(app.should_quit());

    let (_fake, mut app) = setup();
    app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit());
}

#[test]
fn render_shows_units_and_header() {
    let (_fake, mut app) = setup();
    let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
    terminal.draw(|f| ui::render(f, &mut app)).unwrap();

    let screen: String = terminal
        .backend()
        .buffer()
        .content()
        .iter()
        .map(|cell| cell.symbol())
        .collect();
    assert!(screen.contains("user services (3/3)"));
    assert!(screen.contains("alpha.service"));
    assert!(screen.contains("charlie.service"));
    assert!(screen.contains("DESCRIPTION"));
}

#[test]
fn quitting_closes_the_session_once() {
    let (fake, mut app) = setup();
    press(&mut app, KeyCode::Char('q'));
    assert!(app.should_quit());
    assert_eq!(fake.state().closed, 0);

    app.shutdown();
    assert_eq!(fake.state().closed, 1);

    drop(app);
    assert_eq!(fake.state().closed, 1);
}

#[test]
fn shutdown_lets_a_running_action_finish() {
    let (fake, mut app) = setup();
    press(&mut app, KeyCode::Char('x'));
    app.shutdown();

    let state = fake.state();
    assert!(state.calls.contains(&"stop alpha.service".to_string()));
    assert_eq!(state.units[0].active_state, "inactive");
    assert_eq!(state.closed, 1);
}
