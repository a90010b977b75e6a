//! Declarative capability model.
//!
//! A manifest's `requires` lists method names (`ui.showToast`), namespaces
//! (`storage`, `storage.*`) or the wildcard `*`. Plugins that declare
//! nothing predate the model and are allowed everything.
//!
//! Checks are advisory by default: an undeclared call is logged once per
//! method and still executed. Isolation comes from the sandbox having no
//! ambient privileges, not from this check. [`CapabilityMode::Enforce`]
//! turns the same check into a hard deny without any wire change.

use fastwindow_sdk::Method;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Whether `requires` covers `method`.
pub fn is_allowed(requires: Option<&[String]>, method: &str) -> bool {
    let Some(requires) = requires else {
        return true;
    };
    if requires.is_empty() || requires.iter().any(|r| r == "*") {
        return true;
    }

    let namespace = method.split_once('.').map_or(method, |(ns, _)| ns);
    requires.iter().any(|r| {
        r == method || r == namespace || r.strip_suffix(".*") == Some(namespace)
    })
}

/// Reject capability strings that name nothing the host implements.
pub fn validate_capability(capability: &str) -> Result<(), String> {
    let known_namespace = |ns: &str| Method::NAMESPACES.contains(&ns);

    let ok = capability == "*"
        || known_namespace(capability)
        || capability.strip_suffix(".*").is_some_and(known_namespace)
        || Method::from_str(capability).is_ok();

    if ok {
        Ok(())
    } else {
        Err(format!("unknown capability: \"{capability}\""))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityMode {
    /// Log undeclared calls, execute them anyway.
    #[default]
    Advisory,
    /// Reply with an error instead of executing undeclared calls.
    Enforce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    /// Undeclared, executed anyway (advisory mode).
    Undeclared,
    Denied,
}

/// Per-session capability check with one warning per method name.
pub struct CapabilityGate {
    plugin_id: String,
    requires: Option<Vec<String>>,
    mode: CapabilityMode,
    warned: Mutex<BTreeSet<String>>,
}

impl CapabilityGate {
    pub fn new(plugin_id: &str, requires: Option<Vec<String>>, mode: CapabilityMode) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            requires,
            mode,
            warned: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn check(&self, method: &str) -> Verdict {
        if is_allowed(self.requires.as_deref(), method) {
            return Verdict::Allowed;
        }

        if self.warned.lock().insert(method.to_string()) {
            tracing::warn!(
                plugin_id = %self.plugin_id,
                method,
                mode = ?self.mode,
                "Plugin called a method missing from its `requires` list"
            );
        }

        match self.mode {
            CapabilityMode::Advisory => Verdict::Undeclared,
            CapabilityMode::Enforce => Verdict::Denied,
        }
    }

    /// Method names that have produced a warning so far.
    pub fn warned_methods(&self) -> Vec<String> {
        self.warned.lock().iter().cloned().collect()
    }
}
