//! Bidirectional map from a user-facing module name (`qtcharts`) to the set
//! of candidate upstream package names that could satisfy it, with a reverse
//! index used to mark a module resolved once any of its candidates is seen
//! in a catalog.

use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Default)]
pub struct ModuleToPackage {
    forward: IndexMap<String, IndexSet<String>>,
    reverse: IndexMap<String, String>,
}

impl ModuleToPackage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` as satisfiable by any of `candidates`.
    pub fn insert(&mut self, module: impl Into<String>, candidates: impl IntoIterator<Item = String>) {
        let module = module.into();
        let candidates: IndexSet<String> = candidates.into_iter().collect();
        for package in &candidates {
            self.reverse.insert(package.clone(), module.clone());
        }
        self.forward.insert(module, candidates);
    }

    pub fn module_for_package(&self, package: &str) -> Option<&str> {
        self.reverse.get(package).map(String::as_str)
    }

    /// Removes the module that owns `package`, along with every other
    /// candidate package name registered for that module, in time
    /// proportional to the number of candidates for that module.
    pub fn remove_module_for_package(&mut self, package: &str) {
        let Some(module) = self.reverse.get(package).cloned() else {
            return;
        };
        if let Some(candidates) = self.forward.swap_remove(&module) {
            for candidate in candidates {
                self.reverse.swap_remove(&candidate);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn remaining_modules(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_any_candidate_clears_the_module() {
        let mut map = ModuleToPackage::new();
        map.insert(
            "qtcharts",
            ["qt.qt6.650.qtcharts.gcc_64", "qt.650.qtcharts.gcc_64"].map(String::from),
        );
        assert!(!map.is_empty());
        map.remove_module_for_package("qt.qt6.650.qtcharts.gcc_64");
        assert!(map.is_empty());
        assert!(map.module_for_package("qt.650.qtcharts.gcc_64").is_none());
    }

    #[test]
    fn unresolved_modules_are_listed() {
        let mut map = ModuleToPackage::new();
        map.insert("qtcharts", ["qt.qtcharts.gcc_64".to_owned()]);
        map.insert("qtsensors", ["qt.qtsensors.gcc_64".to_owned()]);
        map.remove_module_for_package("qt.qtcharts.gcc_64");
        let remaining: Vec<_> = map.remaining_modules().collect();
        assert_eq!(remaining, vec!["qtsensors"]);
    }
}
