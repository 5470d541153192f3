// Defines the core data structures shared by every front end.

use std::fmt;

/// Suffix systemd uses for service units.
pub const SERVICE_SUFFIX: &str = ".service";

/// Identity and runtime state of one service, as reported by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit {
    pub name: String,
    pub description: String,
    pub load_state: String,   // e.g., "loaded", "not-found"
    pub active_state: String, // e.g., "active", "inactive", "failed"
    pub sub_state: String,    // e.g., "running", "dead", "exited"
}

impl ServiceUnit {
    pub fn state_class(&self) -> StateClass {
        StateClass::of(&self.active_state)
    }
}

/// Extended status of a single service, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetails {
    pub unit: ServiceUnit,
    /// 0 when the service has no main process.
    pub main_pid: u32,
    /// Empty when the origin of the definition is unknown.
    pub fragment_path: String,
    /// Microseconds since the epoch, 0 if never recorded.
    pub active_enter_timestamp: u64,
    pub inactive_enter_timestamp: u64,
}

/// Coarse colouring bucket for an active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Positive,
    Negative,
    Neutral,
}

impl StateClass {
    pub fn of(active_state: &str) -> Self {
        match active_state {
            "active" => StateClass::Positive,
            "failed" => StateClass::Negative,
            _ => StateClass::Neutral,
        }
    }
}

/// Which service manager instance a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    User,
    Privileged,
}

impl Scope {
    pub fn from_privileged(privileged: bool) -> Self {
        if privileged {
            Scope::Privileged
        } else {
            Scope::User
        }
    }

    pub fn is_privileged(self) -> bool {
        self == Scope::Privileged
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User => f.write_str("user"),
            Scope::Privileged => f.write_str("system"),
        }
    }
}

/// A state-changing operation on a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }

    /// Progressive form shown while the action is running.
    pub fn progressive(self) -> &'static str {
        match self {
            ServiceAction::Start => "Starting",
            ServiceAction::Stop => "Stopping",
            ServiceAction::Restart => "Restarting",
        }
    }

    pub fn past(self) -> &'static str {
        match self {
            ServiceAction::Start => "started",
            ServiceAction::Stop => "stopped",
            ServiceAction::Restart => "restarted",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appends `suffix` unless the name already carries it.
pub fn normalize_unit_name(name: &str, suffix: &str) -> String {
    if name.ends_with(suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_appends_missing_suffix() {
        assert_eq!(normalize_unit_name("foo", SERVICE_SUFFIX), "foo.service");
        assert_eq!(
            normalize_unit_name("foo.service", SERVICE_SUFFIX),
            "foo.service"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        for name in ["", "a", "docker", "user@1000.service", "x.service.service", "app.socket"] {
            let once = normalize_unit_name(name, SERVICE_SUFFIX);
            let twice = normalize_unit_name(&once, SERVICE_SUFFIX);
            assert_eq!(once, twice, "input {name:?}");
        }
    }

    #[test]
    fn empty_suffix_leaves_names_alone() {
        assert_eq!(normalize_unit_name("Spooler", ""), "Spooler");
    }

    #[test]
    fn state_class_is_total() {
        assert_eq!(StateClass::of("active"), StateClass::Positive);
        assert_eq!(StateClass::of("failed"), StateClass::Negative);
        for other in ["", "inactive", "activating", "deactivating", "Active", "reloading"] {
            assert_eq!(StateClass::of(other), StateClass::Neutral, "state {other:?}");
        }
    }
}
