mod common;

use common::{FakeBackend, unit};
use svcm::manager::ServiceError;

#[test]
fn bare_names_are_normalized_before_delegation() {
    let fake = FakeBackend::with_units(vec![unit("nginx.service", "inactive", "dead")]);
    let manager = fake.manager();

    manager.start_service("nginx").unwrap();
    manager.stop_service("nginx.service").unwrap();
    manager.restart_service("nginx").unwrap();
    manager.service_details("nginx").unwrap();
    manager.logs("nginx", 10).unwrap();

    assert_eq!(
        fake.state().calls,
        [
            "start nginx.service",
            "stop nginx.service",
            "restart nginx.service",
            "details nginx.service",
            "logs nginx.service 10",
        ]
    );
}

#[test]
fn list_returns_the_full_set() {
    let fake = FakeBackend::with_units(vec![
        unit("a.service", "active", "running"),
        unit("b.service", "failed", "failed"),
    ]);
    let services = fake.manager().list_services().unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[1].name, "b.service");
}

#[test]
fn backend_errors_pass_through() {
    let fake = FakeBackend::with_units(vec![]);
    let manager = fake.manager();
    assert!(matches!(
        manager.start_service("ghost"),
        Err(ServiceError::NotFound(name)) if name == "ghost.service"
    ));

    assert!(matches!(
        manager.service_details("missing"),
        Err(ServiceError::NotFound(name)) if name == "missing.service"
    ));

    fake.state().fail_list = true;
    assert!(matches!(
        manager.list_services(),
        Err(ServiceError::QueryFailed(_))
    ));
}

#[test]
fn close_runs_once_and_later_calls_fail() {
    let fake = FakeBackend::with_units(vec![unit("a.service", "active", "running")]);
    let manager = fake.manager();

    manager.close();
    manager.close();
    assert_eq!(fake.state().closed, 1);

    assert!(matches!(
        manager.list_services(),
        Err(ServiceError::ConnectionLost(_))
    ));
    assert!(matches!(
        manager.start_service("a"),
        Err(ServiceError::ConnectionLost(_))
    ));

    drop(manager);
    assert_eq!(fake.state().closed, 1);
}

#[test]
fn drop_closes_the_session() {
    let fake = FakeBackend::default();
    drop(fake.manager());
    assert_eq!(fake.state().closed, 1);
}
