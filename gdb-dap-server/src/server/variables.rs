//! The variable-object manager: a session-owned cache of GDB varobjs keyed
//! by scope and expression.
//!
//! A varobj is owned by the session: deleting one means removing it from
//! this map *and* sending `-var-delete`, otherwise the GDB-side object
//! leaks. The request handlers that drive this cache live in the session
//! modules; this file is the bookkeeping.

use std::collections::HashMap;

use gdb_mi::MiTuple;

/// `(thread, frame, depth)` scope for a varobj. The stack depth
/// distinguishes same-named locals across recursive frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VariableScope {
    pub thread_id: i64,
    pub frame_id: i64,
    pub depth: i64,
}

impl VariableScope {
    /// Sentinel scope for globals.
    pub const GLOBALS: VariableScope = VariableScope {
        thread_id: -1,
        frame_id: -1,
        depth: -1,
    };
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarObj {
    /// GDB's opaque name ("var12").
    pub varname: String,
    /// The user-facing expression this object evaluates.
    pub expression: String,
    pub type_: String,
    pub numchild: i64,
    pub value: String,
    /// True once the object is known to back a local variable from the
    /// stack's variable list (as opposed to an ad-hoc watch expression).
    pub is_variable: bool,
    /// Children are only reachable by traversal from their parent.
    pub is_child: bool,
}

impl VarObj {
    /// Build from a `-var-create` result.
    pub fn from_create_results(
        expression: impl Into<String>,
        is_variable: bool,
        is_child: bool,
        results: &MiTuple,
    ) -> VarObj {
        VarObj {
            varname: results.string("name").unwrap_or_default().to_string(),
            expression: expression.into(),
            type_: results.string("type").unwrap_or_default().to_string(),
            numchild: results.int("numchild").unwrap_or(0),
            value: results.string("value").unwrap_or_default().to_string(),
            is_variable,
            is_child,
        }
    }

    /// Arrays report a child count but their printed value is noise; the
    /// C++ access pseudo-levels report no type at all.
    pub fn is_array_like(&self) -> bool {
        self.type_.ends_with(']')
    }
}

/// The keyed cache. Lookups accept either the expression or the GDB
/// varname, so one entry serves both without being stored twice.
#[derive(Debug, Default)]
pub struct VarManager {
    map: HashMap<VariableScope, Vec<VarObj>>,
}

impl VarManager {
    pub fn new() -> Self {
        VarManager::default()
    }

    pub fn get(&self, scope: VariableScope, key: &str) -> Option<&VarObj> {
        self.map
            .get(&scope)?
            .iter()
            .find(|v| v.varname == key || v.expression == key)
    }

    /// Insert a freshly created varobj, replacing any entry for the same
    /// expression.
    pub fn add(&mut self, scope: VariableScope, varobj: VarObj) {
        let entries = self.map.entry(scope).or_default();
        entries.retain(|v| v.expression != varobj.expression && v.varname != varobj.varname);
        entries.push(varobj);
    }

    /// Replace an entry in place, typically to upgrade an expression-created
    /// object into a tracked variable once it shows up in the locals list.
    pub fn update(&mut self, scope: VariableScope, varobj: VarObj) -> VarObj {
        let entries = self.map.entry(scope).or_default();
        if let Some(existing) = entries.iter_mut().find(|v| v.varname == varobj.varname) {
            *existing = varobj.clone();
        } else {
            entries.push(varobj.clone());
        }
        varobj
    }

    /// Record a `-var-update` change against a cached entry.
    pub fn apply_change(&mut self, scope: VariableScope, varname: &str, value: &str) {
        if let Some(entries) = self.map.get_mut(&scope) {
            if let Some(entry) = entries.iter_mut().find(|v| v.varname == varname) {
                entry.value = value.to_string();
            }
        }
    }

    /// Remove an entry from the map. The caller still owns sending
    /// `-var-delete`; a failure to send it must not resurrect the map
    /// entry (a stale GDB object is acceptable only during teardown).
    pub fn take(&mut self, scope: VariableScope, key: &str) -> Option<VarObj> {
        let entries = self.map.get_mut(&scope)?;
        let index = entries
            .iter()
            .position(|v| v.varname == key || v.expression == key)?;
        Some(entries.remove(index))
    }

    pub fn vars_for(&self, scope: VariableScope) -> impl Iterator<Item = &VarObj> {
        self.map.get(&scope).into_iter().flatten()
    }

    /// Drop every cached entry, returning the GDB-side names that still
    /// need a `-var-delete`. Children die with their parents, so only
    /// non-child roots are returned.
    pub fn drain(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        for (_, entries) in self.map.drain() {
            for varobj in entries {
                if !varobj.is_child {
                    names.push(varobj.varname);
                }
            }
        }
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gdb_mi::{MiTuple, MiValue};
    use pretty_assertions::assert_eq;

    use super::*;

    fn scope(thread: i64, frame: i64, depth: i64) -> VariableScope {
        VariableScope {
            thread_id: thread,
            frame_id: frame,
            depth,
        }
    }

    fn create_results(name: &str, value: &str, numchild: i64) -> MiTuple {
        let mut results = MiTuple::new();
        results.push("name", MiValue::Const(name.to_string()));
        results.push("numchild", MiValue::Const(numchild.to_string()));
        results.push("value", MiValue::Const(value.to_string()));
        results.push("type", MiValue::Const("int".to_string()));
        results
    }

    #[test]
    fn lookup_by_expression_or_varname() {
        let mut manager = VarManager::new();
        let varobj =
            VarObj::from_create_results("count", true, false, &create_results("var1", "7", 0));
        manager.add(scope(1, 0, 3), varobj);

        assert_eq!(
            manager.get(scope(1, 0, 3), "count").unwrap().varname,
            "var1"
        );
        assert_eq!(
            manager.get(scope(1, 0, 3), "var1").unwrap().expression,
            "count"
        );
        assert!(manager.get(scope(1, 1, 3), "count").is_none());
    }

    #[test]
    fn recursive_frames_with_the_same_local_do_not_collide() {
        let mut manager = VarManager::new();
        manager.add(
            scope(1, 0, 5),
            VarObj::from_create_results("n", true, false, &create_results("var1", "5", 0)),
        );
        manager.add(
            scope(1, 1, 5),
            VarObj::from_create_results("n", true, false, &create_results("var2", "4", 0)),
        );

        assert_eq!(manager.get(scope(1, 0, 5), "n").unwrap().value, "5");
        assert_eq!(manager.get(scope(1, 1, 5), "n").unwrap().value, "4");
    }

    #[test]
    fn take_removes_the_entry() {
        let mut manager = VarManager::new();
        manager.add(
            VariableScope::GLOBALS,
            VarObj::from_create_results("g", false, false, &create_results("var9", "1", 0)),
        );

        let taken = manager.take(VariableScope::GLOBALS, "g").unwrap();
        assert_eq!(taken.varname, "var9");
        assert!(manager.get(VariableScope::GLOBALS, "g").is_none());
        assert!(manager.take(VariableScope::GLOBALS, "g").is_none());
    }

    #[test]
    fn update_upgrades_expression_to_variable() {
        let mut manager = VarManager::new();
        let mut varobj =
            VarObj::from_create_results("x", false, false, &create_results("var3", "1", 0));
        manager.add(scope(1, 0, 1), varobj.clone());

        varobj.is_variable = true;
        manager.update(scope(1, 0, 1), varobj);

        assert!(manager.get(scope(1, 0, 1), "x").unwrap().is_variable);
    }

    #[test]
    fn drain_returns_only_roots() {
        let mut manager = VarManager::new();
        manager.add(
            scope(1, 0, 1),
            VarObj::from_create_results("s", true, false, &create_results("var1", "{…}", 2)),
        );
        manager.add(
            scope(1, 0, 1),
            VarObj::from_create_results("s.a", true, true, &create_results("var1.a", "1", 0)),
        );

        let mut names = manager.drain();
        names.sort();
        assert_eq!(names, vec!["var1"]);
        assert!(manager.get(scope(1, 0, 1), "s").is_none());
    }
}
